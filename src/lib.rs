//! tcpdrop library
//!
//! Point-to-point file transfer over a raw TCP stream: a two-line text header
//! followed by exactly the declared number of payload bytes.

pub mod cli;
pub mod copy;
pub mod error;
pub mod logger;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod receiver;
pub mod sender;

pub use error::TransferError;
pub use progress::{ProgressEvent, ProgressSink, TransferStats};
pub use protocol_core::{decode_header, encode_header, TransferHeader};
