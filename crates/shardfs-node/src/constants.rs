//! Node configuration defaults.

pub use shardfs_proto::constants::{ACK_TIMEOUT, DEFAULT_BIND_ADDRESS, FINAL_ACK_TIMEOUT};

/// Prefix for archives built in the temp directory.
pub const ARCHIVE_PREFIX: &str = "shardfs";

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "~/.config/shardfs/node.toml";
