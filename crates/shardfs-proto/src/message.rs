//! Control tokens exchanged around a payload.

use std::fmt;

use crate::constants::{ERROR_MARKER, MAX_FILE_SIZE};
use crate::error::{ProtoError, ProtoResult};

/// One control line, parsed.
///
/// Tokens only become text at the wire boundary; everything above the
/// [`Wire`](crate::Wire) works with this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Responder is ready for the size of an upload.
    Ready,
    /// Size accepted; payload may follow.
    SizeAck,
    /// Operation complete.
    Success,
    /// Declared payload length in bytes.
    Size(u64),
    /// Failure, text after the `ERROR:` marker.
    Error(String),
    /// Anything else.
    Other(String),
}

impl Message {
    /// Parse a control line with its terminator already stripped.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches('\r');
        match line {
            "READY" => return Self::Ready,
            "SIZE_ACK" => return Self::SizeAck,
            "SUCCESS" => return Self::Success,
            _ => {}
        }

        if let Some(rest) = line
            .strip_prefix(ERROR_MARKER)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return Self::Error(rest.trim().to_string());
        }

        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = line.parse::<u64>() {
                return Self::Size(n);
            }
        }

        Self::Other(line.to_string())
    }

    /// Build the error token for `err`.
    pub fn error(err: &ProtoError) -> Self {
        Self::Error(err.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("READY"),
            Self::SizeAck => f.write_str("SIZE_ACK"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Size(n) => write!(f, "{n}"),
            Self::Error(msg) => write!(f, "{ERROR_MARKER}: {msg}"),
            Self::Other(text) => f.write_str(text),
        }
    }
}

/// Check a declared payload length against `0 < n <= MAX_FILE_SIZE`.
pub fn validate_size(n: u64) -> ProtoResult<u64> {
    if n == 0 {
        return Err(ProtoError::size_invalid("length must be greater than zero"));
    }
    if n > MAX_FILE_SIZE {
        return Err(ProtoError::size_invalid(format!(
            "{n} bytes exceeds the {MAX_FILE_SIZE} byte limit"
        )));
    }
    Ok(n)
}
