//! Error types for a single transfer attempt.

use std::io;
use std::path::PathBuf;

/// Errors produced while sending or receiving one file.
///
/// Every variant is local to one transfer; none of them is retried.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("header parse failed: {0}")]
    Protocol(String),

    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("dial {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("read failed after {transferred} bytes: {source}")]
    IoRead {
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("write failed after {transferred} bytes: {source}")]
    IoWrite {
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("transfer truncated: stream closed after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("cannot access {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create {}: {source}", path.display())]
    FileCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Short label of the stage that failed, for user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            TransferError::Protocol(_) => "header parse",
            TransferError::InvalidFileName { .. } => "header encode",
            TransferError::Connect { .. } => "dial",
            TransferError::Bind { .. } => "bind",
            TransferError::Accept(_) => "accept",
            TransferError::IoRead { .. } | TransferError::Truncated { .. } => "read",
            TransferError::IoWrite { .. } => "write",
            TransferError::FileNotFound { .. } | TransferError::FileAccess { .. } => "open",
            TransferError::FileCreate { .. } => "create",
        }
    }

    /// Payload bytes moved before the failure, where that is known.
    pub fn bytes_transferred(&self) -> Option<u64> {
        match self {
            TransferError::IoRead { transferred, .. }
            | TransferError::IoWrite { transferred, .. } => Some(*transferred),
            TransferError::Truncated { received, .. } => Some(*received),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_name_the_failing_step() {
        let e = TransferError::Protocol("bad size".into());
        assert_eq!(e.stage(), "header parse");

        let e = TransferError::Connect {
            addr: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(e.stage(), "dial");
        assert!(e.to_string().starts_with("dial 127.0.0.1:1 failed"));

        let e = TransferError::FileCreate {
            path: PathBuf::from("/nope/received_a"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(e.stage(), "create");
    }

    #[test]
    fn truncated_reports_received_count() {
        let e = TransferError::Truncated {
            received: 10,
            expected: 20,
        };
        assert_eq!(e.stage(), "read");
        assert_eq!(e.bytes_transferred(), Some(10));
        assert_eq!(
            e.to_string(),
            "transfer truncated: stream closed after 10 of 20 bytes"
        );
    }
}
