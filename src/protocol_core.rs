//! Header codec and output-path logic shared by the sender and the receiver
//!
//! The header is two newline-terminated text lines: the decimal payload size,
//! then the file name. Nothing is escaped, so a newline inside the name is
//! rejected instead of being written.

use crate::error::TransferError;
use crate::protocol::{LINE_TERMINATOR, MAX_HEADER_LINE, RECEIVED_PREFIX, DEFAULT_RECEIVE_PATH};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Metadata announced before the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    payload_size: u64,
    file_name: String,
}

impl TransferHeader {
    pub fn new(payload_size: u64, file_name: impl Into<String>) -> Result<Self, TransferError> {
        let file_name = file_name.into();
        validate_file_name(&file_name)?;
        Ok(Self {
            payload_size,
            file_name,
        })
    }

    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn encode(&self) -> Vec<u8> {
        frame_bytes(self.payload_size, &self.file_name)
    }
}

fn validate_file_name(name: &str) -> Result<(), TransferError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.as_bytes().contains(&LINE_TERMINATOR) {
        "must not contain a newline"
    } else if name.len() >= MAX_HEADER_LINE {
        "too long for a header line"
    } else {
        return Ok(());
    };
    Err(TransferError::InvalidFileName {
        name: name.to_string(),
        reason,
    })
}

fn frame_bytes(size: u64, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 22);
    out.extend_from_slice(size.to_string().as_bytes());
    out.push(LINE_TERMINATOR);
    out.extend_from_slice(name.as_bytes());
    out.push(LINE_TERMINATOR);
    out
}

/// Build the header bytes for a payload of `size` bytes named `name`.
pub fn encode_header(size: u64, name: &str) -> Result<Vec<u8>, TransferError> {
    validate_file_name(name)?;
    Ok(frame_bytes(size, name))
}

/// Read exactly one header from `reader`.
///
/// Consumes both terminators and nothing past them, so payload bytes that
/// arrived in the same segment stay buffered in `reader`.
pub async fn decode_header<R>(reader: &mut R) -> Result<TransferHeader, TransferError>
where
    R: AsyncBufRead + Unpin,
{
    let size_line = read_header_line(reader, "payload size").await?;
    let payload_size = parse_payload_size(&size_line)?;

    let name_line = read_header_line(reader, "file name").await?;
    let file_name = String::from_utf8(name_line)
        .map_err(|_| TransferError::Protocol("file name is not valid UTF-8".into()))?;
    if file_name.is_empty() {
        return Err(TransferError::Protocol("file name is empty".into()));
    }

    Ok(TransferHeader {
        payload_size,
        file_name,
    })
}

async fn read_header_line<R>(reader: &mut R, field: &str) -> Result<Vec<u8>, TransferError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(MAX_HEADER_LINE as u64);
    let n = limited
        .read_until(LINE_TERMINATOR, &mut line)
        .await
        .map_err(|source| TransferError::IoRead {
            transferred: 0,
            source,
        })?;

    if line.last() == Some(&LINE_TERMINATOR) {
        line.pop();
        return Ok(line);
    }
    if n >= MAX_HEADER_LINE {
        return Err(TransferError::Protocol(format!(
            "{field} line exceeds {MAX_HEADER_LINE} bytes"
        )));
    }
    Err(TransferError::Protocol(format!(
        "stream ended before {field} terminator"
    )))
}

fn parse_payload_size(line: &[u8]) -> Result<u64, TransferError> {
    if line.is_empty() || !line.iter().all(u8::is_ascii_digit) {
        return Err(TransferError::Protocol(format!(
            "payload size {:?} is not a non-negative decimal integer",
            String::from_utf8_lossy(line)
        )));
    }
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| TransferError::Protocol("payload size overflows u64".into()))
}

/// Reject declared names that would place the output outside its directory.
pub fn ensure_plain_file_name(name: &str) -> Result<(), TransferError> {
    if name.contains('\0') {
        return Err(TransferError::Protocol("file name contains NUL byte".into()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == OsStr::new(name) => Ok(()),
        _ => Err(TransferError::Protocol(format!(
            "declared file name {name:?} is not a plain file name"
        ))),
    }
}

/// Compute where a received file named `file_name` is written.
///
/// The output is always `received_<file_name>`, placed in the directory
/// component of `base`, or in the current directory when `base` has none.
pub fn derive_output_path(base: Option<&Path>, file_name: &str) -> Result<PathBuf, TransferError> {
    ensure_plain_file_name(file_name)?;
    let target = format!("{RECEIVED_PREFIX}{file_name}");

    let base = base.filter(|b| !b.as_os_str().is_empty() && *b != Path::new(DEFAULT_RECEIVE_PATH));
    let dir = base
        .and_then(Path::parent)
        .filter(|d| !d.as_os_str().is_empty() && *d != Path::new("."));

    Ok(match dir {
        Some(d) => d.join(target),
        None => PathBuf::from(target),
    })
}
