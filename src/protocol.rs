//! Shared protocol constants for the tcpdrop line-framed transport
//!
//! Wire layout of one transfer (one TCP connection per file):
//!
//! ```text
//! <decimal-byte-count> '\n'
//! <file-name-without-newline> '\n'
//! <raw payload bytes, exactly byte-count bytes>
//! ```

/// Header field terminator. Disallowed inside either header field.
pub const LINE_TERMINATOR: u8 = b'\n';

// Upper bound for a single header line, terminator included.
// A peer that never sends '\n' cannot grow the header buffer past this.
pub const MAX_HEADER_LINE: usize = 4096;

/// Copy buffer size for one chunk. Tuning knob only, never sent on the wire.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Marker prepended to every received file name
pub const RECEIVED_PREFIX: &str = "received_";

/// Base path used by the receiver when none was supplied
pub const DEFAULT_RECEIVE_PATH: &str = "received_file";

pub const DEFAULT_PORT: u16 = 8888;
pub const MAX_PORT: u16 = 9999;
pub const DEFAULT_HOST: &str = "localhost";

// Progress step (percent) used by the non-interactive reporter
pub const PROGRESS_STEP_PERCENT: u64 = 5;
