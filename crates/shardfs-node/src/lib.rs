//! shardfs node library
//!
//! One process plays one of four roles. S1 is the public node: it keeps `.c`
//! files (and anything of unknown class), serves interactive client sessions,
//! forwards `.pdf`, `.txt` and `.zip` requests to S2, S3 and S4, and merges
//! listings across all four. S2–S4 answer one request per connection against
//! their own namespace.

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod constants;
pub mod context;
pub mod namespace;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod session;
pub mod shard;
pub mod storage;

pub use archive::{ArchiveBuilder, TarArchiver, TempArchive};
pub use config::{ConfigError, NodeConfig, PeerConfig};
pub use context::NodeContext;
pub use namespace::Namespace;
pub use proxy::ForwardingProxy;
pub use routing::Router;
pub use server::NodeServer;
pub use storage::Storage;
