//! Receiving side: an accept loop that hands every connection to its own
//! task, and the per-connection handler that turns one header plus payload
//! into one output file.

use crate::copy::{copy_stream, CopyBound};
use crate::error::TransferError;
use crate::logger::{Direction, Logger, NoopLogger};
use crate::progress::{noop_factory, ProgressFactory, ProgressSink, TransferStats};
use crate::protocol::CHUNK_SIZE;
use crate::protocol_core::{decode_header, derive_output_path, TransferHeader};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Handler states, entered strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    AwaitHeader,
    DeriveOutput,
    Receiving,
    Complete,
}

impl Stage {
    fn advance(&mut self, next: Stage, peer: &str) {
        debug_assert!(next > *self, "stage {} cannot move to {}", self, next);
        debug!(peer, from = %self, to = %next, "stage");
        *self = next;
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::AwaitHeader => "await-header",
            Stage::DeriveOutput => "derive-output",
            Stage::Receiving => "receiving",
            Stage::Complete => "complete",
        })
    }
}

/// Read-only settings shared by every connection handler.
pub struct ReceiverConfig {
    /// Base path hint; only its directory part is used.
    pub base_path: Option<PathBuf>,
    pub progress: ProgressFactory,
    pub logger: Arc<dyn Logger>,
}

impl ReceiverConfig {
    pub fn new(base_path: Option<PathBuf>) -> Self {
        Self {
            base_path,
            progress: noop_factory(),
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFactory) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

/// Bind `0.0.0.0:port` and serve forever.
///
/// Only a bind failure is returned; per-connection failures are logged and
/// never stop the loop.
pub async fn listen(port: u16, config: ReceiverConfig) -> Result<(), TransferError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| TransferError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "listening");
    serve(listener, config).await;
    Ok(())
}

/// Accept connections on an already bound listener, one task per connection.
pub async fn serve(listener: TcpListener, config: ReceiverConfig) {
    let config = Arc::new(config);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                let e = TransferError::Accept(e);
                warn!(error = %e, "accept failed, continuing");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "set_nodelay failed");
        }
        info!(%peer, "connection accepted");

        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let peer = peer.to_string();
            // Outcome is already logged by the handler.
            let _ = handle_connection(stream, &peer, &config).await;
        });
    }
}

/// Receive one transfer from `stream`.
///
/// Output is written under a `received_` name. On failure the partial output
/// file, if any, is left in place.
pub async fn handle_connection<S>(
    stream: S,
    peer: &str,
    config: &ReceiverConfig,
) -> Result<TransferStats, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut stage = Stage::AwaitHeader;
    let result = receive(stream, peer, config, &mut stage).await;

    match &result {
        Ok(stats) => info!(
            peer,
            file = %stats.file_name,
            bytes = stats.bytes,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "transfer complete"
        ),
        Err(e) => {
            warn!(peer, %stage, error = %e, "transfer failed");
            config
                .logger
                .error(Direction::Receive, peer, e.stage(), &e.to_string());
        }
    }
    result
}

async fn receive<S>(
    stream: S,
    peer: &str,
    config: &ReceiverConfig,
    stage: &mut Stage,
) -> Result<TransferStats, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, stream);
    let header = decode_header(&mut reader).await?;
    info!(
        peer,
        file = header.file_name(),
        bytes = header.payload_size(),
        "receiving"
    );

    stage.advance(Stage::DeriveOutput, peer);
    let output = derive_output_path(config.base_path.as_deref(), header.file_name())?;

    stage.advance(Stage::Receiving, peer);
    let mut progress = (config.progress)(&header);
    config.logger.start(
        Direction::Receive,
        peer,
        header.file_name(),
        header.payload_size(),
    );
    let started = Instant::now();

    let copied = match write_payload(&mut reader, &header, &output, progress.as_mut()).await {
        Ok(n) => n,
        Err(e) => {
            progress.fail(&format!("{e} (output: {})", output.display()));
            return Err(e);
        }
    };

    stage.advance(Stage::Complete, peer);
    let elapsed = started.elapsed();
    progress.finish(
        copied,
        &format!("File received at {}", output.display()),
        elapsed,
    );
    config
        .logger
        .done(Direction::Receive, peer, &output, copied, elapsed.as_secs_f64());

    Ok(TransferStats {
        file_name: header.file_name().to_string(),
        bytes: copied,
        elapsed,
        output_path: Some(output),
    })
}

async fn write_payload<R>(
    reader: &mut R,
    header: &TransferHeader,
    output: &Path,
    progress: &mut dyn ProgressSink,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(output)
        .await
        .map_err(|source| TransferError::FileCreate {
            path: output.to_path_buf(),
            source,
        })?;
    let declared = header.payload_size();
    copy_stream(reader, &mut file, CopyBound::Exact(declared), declared, progress).await
}
