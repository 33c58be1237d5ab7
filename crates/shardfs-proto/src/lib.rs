//! shardfs wire protocol
//!
//! Shared by every node and by the client. A link carries newline-terminated
//! UTF-8 control lines; payloads follow a control exchange as raw bytes whose
//! length was negotiated beforehand.
//!
//! ## Upload
//!
//! ```text
//! requester            responder
//!   <command>   ──▶
//!               ◀──    READY
//!   <length>    ──▶
//!               ◀──    SIZE_ACK
//!   <payload>   ──▶
//!               ◀──    SUCCESS | ERROR: ...
//! ```
//!
//! ## Download
//!
//! ```text
//!   <command>   ──▶
//!               ◀──    <length> | ERROR: ...
//!   SIZE_ACK    ──▶
//!               ◀──    <payload>
//!   SUCCESS     ──▶    (best effort)
//! ```

pub mod class;
pub mod command;
pub mod constants;
pub mod error;
pub mod message;
pub mod requester;
pub mod transfer;
pub mod wire;

pub use class::{FileClass, FileListing, ShardId, ShardKey, extension_of};
pub use command::{Command, Request};
pub use error::{ProtoError, ProtoResult};
pub use message::{Message, validate_size};
pub use transfer::{Direction, PumpFailure, TransferSession};
pub use wire::Wire;
