//! Progress reporting for a single transfer
//!
//! The copier pushes a [`ProgressEvent`] after every chunk into a
//! [`ProgressSink`] owned by whoever drives the transfer. Nothing here is
//! global: each transfer gets its own sink, so concurrent receives never
//! share a cursor or counter.

use crate::protocol::PROGRESS_STEP_PERCENT;
use crate::protocol_core::TransferHeader;
use crossterm::style::{Color, Stylize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Cumulative position after one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub bytes_so_far: u64,
    pub total_bytes: u64,
}

impl ProgressEvent {
    /// Whole percent completed; an empty payload counts as done.
    pub fn percent(&self) -> u64 {
        if self.total_bytes == 0 {
            return 100;
        }
        (self.bytes_so_far as u128 * 100 / self.total_bytes as u128).min(100) as u64
    }
}

/// Receiver of progress updates. Calls must not block the transfer.
pub trait ProgressSink: Send {
    fn update(&mut self, event: ProgressEvent);
    fn finish(&mut self, total_bytes: u64, label: &str, elapsed: Duration);
    fn fail(&mut self, _message: &str) {}
}

/// Builds one sink per accepted connection once its header is known.
pub type ProgressFactory = Arc<dyn Fn(&TransferHeader) -> Box<dyn ProgressSink> + Send + Sync>;

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update(&mut self, _event: ProgressEvent) {}
    fn finish(&mut self, _total_bytes: u64, _label: &str, _elapsed: Duration) {}
}

/// Outcome of one completed transfer
#[derive(Debug, Clone)]
pub struct TransferStats {
    pub file_name: String,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Where the receiver wrote the payload; `None` on the sending side.
    pub output_path: Option<PathBuf>,
}

impl TransferStats {
    pub fn throughput_kib(&self) -> f64 {
        throughput_kib(self.bytes, self.elapsed)
    }
}

fn throughput_kib(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs / 1024.0
    } else {
        0.0
    }
}

/// Final one-line summary: bytes, elapsed time, throughput.
pub fn summary_line(total_bytes: u64, label: &str, elapsed: Duration) -> String {
    format!(
        "{} successfully! Total: {} bytes in {:.2}s ({:.1} KB/s)",
        label,
        total_bytes,
        elapsed.as_secs_f64(),
        throughput_kib(total_bytes, elapsed)
    )
}

/// Interactive bar, optionally one row of a [`MultiProgress`]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(name: &str, total_bytes: u64) -> Self {
        Self::with_bar(ProgressBar::new(total_bytes), name)
    }

    pub fn in_group(group: &MultiProgress, name: &str, total_bytes: u64) -> Self {
        Self::with_bar(group.add(ProgressBar::new(total_bytes)), name)
    }

    fn with_bar(bar: ProgressBar, name: &str) -> Self {
        bar.set_style(
            ProgressStyle::with_template(
                "{prefix} [{bar:20}] {percent:>3}% - {binary_bytes_per_sec}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░"),
        );
        bar.set_prefix(name.to_string());
        Self { bar }
    }

    fn finish_with(&self, msg: String) {
        self.bar.set_style(
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        self.bar.finish_with_message(msg);
    }
}

impl ProgressSink for BarProgress {
    fn update(&mut self, event: ProgressEvent) {
        self.bar.set_length(event.total_bytes);
        self.bar.set_position(event.bytes_so_far);
    }

    fn finish(&mut self, total_bytes: u64, label: &str, elapsed: Duration) {
        self.finish_with(format!(
            "{} {}",
            "✓".with(Color::Green).bold(),
            summary_line(total_bytes, label, elapsed)
        ));
    }

    fn fail(&mut self, message: &str) {
        self.finish_with(format!("{} {}", "Failed".with(Color::Red).bold(), message));
    }
}

/// Non-interactive reporter: one log event per completed step.
pub struct StepProgress {
    name: String,
    last_step: Option<u64>,
}

impl StepProgress {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_step: None,
        }
    }
}

impl ProgressSink for StepProgress {
    fn update(&mut self, event: ProgressEvent) {
        let step = event.percent() / PROGRESS_STEP_PERCENT * PROGRESS_STEP_PERCENT;
        if self.last_step == Some(step) {
            return;
        }
        self.last_step = Some(step);
        info!(
            file = %self.name,
            bytes = event.bytes_so_far,
            total = event.total_bytes,
            "{step}%"
        );
    }

    fn finish(&mut self, total_bytes: u64, label: &str, elapsed: Duration) {
        info!(file = %self.name, "{}", summary_line(total_bytes, label, elapsed));
    }

    fn fail(&mut self, message: &str) {
        warn!(file = %self.name, "{message}");
    }
}

pub fn noop_factory() -> ProgressFactory {
    Arc::new(|_header: &TransferHeader| Box::new(NoopProgress) as Box<dyn ProgressSink>)
}

pub fn bar_factory(group: MultiProgress) -> ProgressFactory {
    Arc::new(move |header: &TransferHeader| {
        Box::new(BarProgress::in_group(
            &group,
            header.file_name(),
            header.payload_size(),
        )) as Box<dyn ProgressSink>
    })
}

pub fn step_factory() -> ProgressFactory {
    Arc::new(|header: &TransferHeader| {
        Box::new(StepProgress::new(header.file_name())) as Box<dyn ProgressSink>
    })
}
