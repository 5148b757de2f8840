//! Command-line arguments and their validation into a [`Config`]

use crate::protocol::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RECEIVE_PATH, MAX_PORT};
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Send,
    Receive,
}

/// tcpdrop - send a single file to a listening receiver over TCP
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Transfer direction
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// Port to connect to (send) or listen on (receive)
    #[arg(long, default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..=MAX_PORT as i64))]
    pub port: u16,

    /// File to send, or base path whose directory receives files
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Receiver address (send mode)
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Append a line per transfer event to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Log progress in 5% steps instead of drawing bars
    #[arg(long)]
    pub no_progress: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated parameters handed to the sender or the receiver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub host: String,
    pub port: u16,
    pub path: PathBuf,
}

impl Args {
    /// Apply mode-specific rules: send needs a path, receive falls back to
    /// the default base path.
    pub fn into_config(self) -> Result<Config> {
        let path = match (self.mode, self.path) {
            (_, Some(p)) => p,
            (Mode::Send, None) => bail!("--path is required for send mode"),
            (Mode::Receive, None) => {
                tracing::warn!(
                    "no --path given for receive mode, using default: {}",
                    DEFAULT_RECEIVE_PATH
                );
                PathBuf::from(DEFAULT_RECEIVE_PATH)
            }
        };
        Ok(Config {
            mode: self.mode,
            host: self.host,
            port: self.port,
            path,
        })
    }
}
