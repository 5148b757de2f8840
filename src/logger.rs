use anyhow::Result;
use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Send => "SEND",
            Direction::Receive => "RECV",
        })
    }
}

/// Audit trail of transfers. Shared across receiver tasks, so `&self` only.
pub trait Logger: Send + Sync {
    fn start(&self, _dir: Direction, _peer: &str, _name: &str, _size: u64) {}
    fn done(&self, _dir: Direction, _peer: &str, _path: &Path, _bytes: u64, _seconds: f64) {}
    fn error(&self, _dir: Direction, _peer: &str, _stage: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, dir: Direction, peer: &str, name: &str, size: u64) {
        self.line(&format!("{dir} START peer={peer} name={name} size={size}"));
    }
    fn done(&self, dir: Direction, peer: &str, path: &Path, bytes: u64, seconds: f64) {
        self.line(&format!(
            "{dir} DONE peer={} path={} bytes={} seconds={:.3}",
            peer,
            path.display(),
            bytes,
            seconds
        ));
    }
    fn error(&self, dir: Direction, peer: &str, stage: &str, msg: &str) {
        self.line(&format!("{dir} ERROR peer={peer} stage={stage} msg={msg}"));
    }
}
