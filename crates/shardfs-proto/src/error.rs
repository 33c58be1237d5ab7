//! Protocol error types.

use std::io;
use thiserror::Error;

use crate::class::ShardId;

/// Error raised anywhere along a protocol exchange.
///
/// The `Display` text is what the peer sees after the `ERROR: ` marker, so
/// messages are written for the person at the other end of the link.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Unknown verb, missing argument, or unreadable control line.
    #[error("{0}")]
    MalformedCommand(String),

    /// Path outside the node's namespace or otherwise unusable.
    #[error("{0}")]
    PathRejected(String),

    /// Target file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Local filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Declared length is zero, above the ceiling, or not a number.
    #[error("Invalid file size: {0}")]
    SizeInvalid(String),

    /// Peer answered with something other than the expected token.
    #[error("Protocol violation: {0}")]
    Handshake(String),

    /// Peer closed the link while a reply was outstanding.
    #[error("Connection closed by peer")]
    Disconnected,

    /// Socket-level failure on the link itself.
    #[error("Connection error: {0}")]
    Link(#[source] io::Error),

    /// Payload ended before the declared length was reached.
    #[error("File receive error: got {transferred} of {expected} bytes")]
    Truncated { expected: u64, transferred: u64 },

    /// More payload bytes than declared.
    #[error("Transfer exceeded declared length of {expected} bytes")]
    Overrun { expected: u64 },

    /// Archive class this node cannot bundle.
    #[error("{0}")]
    UnsupportedClass(String),

    /// Error line received from the responder, relayed verbatim.
    #[error("{0}")]
    Remote(String),

    /// Requester answered a prompt with an error line of its own.
    #[error("Requester aborted: {0}")]
    Aborted(String),

    /// The owning shard could not complete its leg of a forwarded request.
    #[error("{shard}: {reason}")]
    Upstream { shard: ShardId, reason: String },
}

impl ProtoError {
    /// Create a MalformedCommand error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCommand(msg.into())
    }

    /// Create a PathRejected error.
    pub fn path_rejected(msg: impl Into<String>) -> Self {
        Self::PathRejected(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an Io error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a SizeInvalid error.
    pub fn size_invalid(msg: impl Into<String>) -> Self {
        Self::SizeInvalid(msg.into())
    }

    /// Create a Handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create an UnsupportedClass error.
    pub fn unsupported_class(msg: impl Into<String>) -> Self {
        Self::UnsupportedClass(msg.into())
    }

    /// Create an Upstream error for `shard`.
    pub fn upstream(shard: ShardId, reason: impl Into<String>) -> Self {
        Self::Upstream {
            shard,
            reason: reason.into(),
        }
    }

    /// Reinterpret an error line that came from the requester side of a link.
    ///
    /// A responder must not echo such a line back, so `Remote` becomes `Aborted`.
    pub fn from_requester(self) -> Self {
        match self {
            Self::Remote(msg) => Self::Aborted(msg),
            other => other,
        }
    }

    /// Whether the link can no longer be trusted to be aligned on a line boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_)
                | Self::Disconnected
                | Self::Link(_)
                | Self::Truncated { .. }
                | Self::Overrun { .. }
        )
    }

    /// Whether the error should be sent back to the requester as an `ERROR:` line.
    pub fn reportable(&self) -> bool {
        !matches!(
            self,
            Self::Disconnected
                | Self::Link(_)
                | Self::Truncated { .. }
                | Self::Overrun { .. }
                | Self::Aborted(_)
        )
    }
}

/// Protocol result type.
pub type ProtoResult<T> = Result<T, ProtoError>;
