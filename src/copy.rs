//! Chunked copy between a file and a connection
//! One buffer, strict read-then-write alternation, progress after each chunk

use crate::error::TransferError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::protocol::CHUNK_SIZE;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// How far the copier may read from its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyBound {
    /// Read exactly this many bytes. Reads are clamped so nothing past the
    /// bound is consumed; an early end of input is a truncation.
    Exact(u64),
    /// Read until the source reports end of input.
    UntilEof,
}

/// Copy `source` into `sink`, reporting `(copied, total)` after every chunk.
///
/// `total` only feeds progress events; the amount read is governed by `bound`.
/// Returns the number of bytes copied.
pub async fn copy_stream<R, W>(
    source: &mut R,
    sink: &mut W,
    bound: CopyBound,
    total: u64,
    progress: &mut dyn ProgressSink,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;

    loop {
        let want = match bound {
            CopyBound::Exact(limit) => {
                let remaining = limit - copied;
                if remaining == 0 {
                    break;
                }
                remaining.min(CHUNK_SIZE as u64) as usize
            }
            CopyBound::UntilEof => CHUNK_SIZE,
        };

        let n = match source.read(&mut buffer[..want]).await {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::IoRead {
                    transferred: copied,
                    source,
                })
            }
        };

        if n == 0 {
            if let CopyBound::Exact(expected) = bound {
                return Err(TransferError::Truncated {
                    received: copied,
                    expected,
                });
            }
            break;
        }

        sink.write_all(&buffer[..n])
            .await
            .map_err(|source| TransferError::IoWrite {
                transferred: copied,
                source,
            })?;
        copied += n as u64;
        progress.update(ProgressEvent {
            bytes_so_far: copied,
            total_bytes: total,
        });
    }

    sink.flush().await.map_err(|source| TransferError::IoWrite {
        transferred: copied,
        source,
    })?;

    // Empty payloads still get one event so sinks can render completion.
    if copied == 0 {
        progress.update(ProgressEvent {
            bytes_so_far: 0,
            total_bytes: total,
        });
    }

    Ok(copied)
}
