//! tcpdrop - send one file to a listening receiver over plain TCP
//!
//! `--mode send` pushes a single file; `--mode receive` listens and writes
//! every incoming file under a `received_` name, several at a time.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tcpdrop::cli::{Args, Config, Mode};
use tcpdrop::logger::{Logger, NoopLogger, TextLogger};
use tcpdrop::progress::{bar_factory, step_factory, BarProgress, ProgressSink, StepProgress};
use tcpdrop::{receiver, sender};

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Choose logger once; zero overhead with NoopLogger
    let logger: Arc<dyn Logger> = match args.log_file {
        Some(ref p) => Arc::new(
            TextLogger::new(p).with_context(|| format!("open log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };
    let bars = !args.no_progress;

    let config = args.into_config()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.mode,
        port = config.port,
        path = %config.path.display(),
        "starting tcpdrop"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match config.mode {
        Mode::Send => rt.block_on(run_send(&config, bars, logger.as_ref())),
        Mode::Receive => rt.block_on(run_receive(config, bars, logger)),
    }
}

async fn run_send(config: &Config, bars: bool, logger: &dyn Logger) -> Result<()> {
    let name = config
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut progress: Box<dyn ProgressSink> = if bars {
        // length is set from the first progress event
        Box::new(BarProgress::new(&name, 0))
    } else {
        Box::new(StepProgress::new(&name))
    };

    sender::send(
        &config.host,
        config.port,
        &config.path,
        progress.as_mut(),
        logger,
    )
    .await
    .with_context(|| format!("send {} to {}:{}", config.path.display(), config.host, config.port))?;
    Ok(())
}

async fn run_receive(config: Config, bars: bool, logger: Arc<dyn Logger>) -> Result<()> {
    let progress = if bars {
        bar_factory(MultiProgress::new())
    } else {
        step_factory()
    };
    let receiver_config = receiver::ReceiverConfig::new(Some(config.path))
        .with_progress(progress)
        .with_logger(logger);

    receiver::listen(config.port, receiver_config)
        .await
        .with_context(|| format!("listen on port {}", config.port))
}
