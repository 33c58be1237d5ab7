//! Protocol constants.

use std::time::Duration;

/// Largest payload a node accepts or serves (100 MiB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Size of the buffer used to copy payload bytes between a source and a sink.
pub const RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// Longest control line accepted, including the terminating newline.
pub const MAX_LINE_LEN: u64 = 4096;

/// Every failure line starts with this marker followed by `:`.
pub const ERROR_MARKER: &str = "ERROR";

/// How long a responder waits for `SIZE_ACK` before abandoning a download.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a responder waits for the requester's closing `SUCCESS`.
pub const FINAL_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Port of the public node; shard N listens on `DEFAULT_BASE_PORT + N - 1`.
pub const DEFAULT_BASE_PORT: u16 = 8080;

/// Default bind address (localhost only).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
