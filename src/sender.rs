//! Sending side: one file, one connection, one attempt.

use crate::copy::{copy_stream, CopyBound};
use crate::error::TransferError;
use crate::logger::{Direction, Logger};
use crate::progress::{ProgressSink, TransferStats};
use crate::protocol_core::TransferHeader;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Send the file at `path` to a receiver listening on `host:port`.
///
/// The declared size is the file length at open time. The file and the
/// connection are closed on every return path; no step is retried.
pub async fn send(
    host: &str,
    port: u16,
    path: &Path,
    progress: &mut dyn ProgressSink,
    logger: &dyn Logger,
) -> Result<TransferStats, TransferError> {
    let addr = format!("{host}:{port}");

    let result = send_file(host, port, &addr, path, &mut *progress, logger).await;

    match &result {
        Ok(stats) => {
            progress.finish(stats.bytes, "File sent", stats.elapsed);
            logger.done(
                Direction::Send,
                &addr,
                path,
                stats.bytes,
                stats.elapsed.as_secs_f64(),
            );
            info!(%addr, bytes = stats.bytes, "send complete");
        }
        Err(e) => {
            progress.fail(&e.to_string());
            logger.error(Direction::Send, &addr, e.stage(), &e.to_string());
        }
    }
    result
}

async fn send_file(
    host: &str,
    port: u16,
    addr: &str,
    path: &Path,
    progress: &mut dyn ProgressSink,
    logger: &dyn Logger,
) -> Result<TransferStats, TransferError> {
    let mut file = File::open(path).await.map_err(|source| open_error(path, source))?;
    let meta = file
        .metadata()
        .await
        .map_err(|source| TransferError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_file() {
        return Err(TransferError::FileAccess {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    let declared = meta.len();

    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| TransferError::InvalidFileName {
            name: path.display().to_string(),
            reason: "path has no UTF-8 file name",
        })?;
    let header = TransferHeader::new(declared, name)?;

    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| TransferError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%addr, error = %e, "set_nodelay failed");
    }

    info!(%addr, file = name, bytes = declared, "sending");
    logger.start(Direction::Send, addr, name, declared);
    let started = Instant::now();

    stream
        .write_all(&header.encode())
        .await
        .map_err(|source| TransferError::IoWrite {
            transferred: 0,
            source,
        })?;
    debug!(%addr, "header written");

    let copied = copy_stream(&mut file, &mut stream, CopyBound::UntilEof, declared, progress).await?;
    stream
        .shutdown()
        .await
        .map_err(|source| TransferError::IoWrite {
            transferred: copied,
            source,
        })?;

    if copied != declared {
        warn!(
            file = name,
            declared,
            copied,
            "file changed size during send; receiver output will not match"
        );
    }

    Ok(TransferStats {
        file_name: name.to_string(),
        bytes: copied,
        elapsed: started.elapsed(),
        output_path: None,
    })
}

fn open_error(path: &Path, source: io::Error) -> TransferError {
    if source.kind() == io::ErrorKind::NotFound {
        TransferError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        TransferError::FileAccess {
            path: path.to_path_buf(),
            source,
        }
    }
}
