//! Per-node services shared by every connection.

use std::sync::Arc;

use shardfs_proto::ShardId;

use crate::archive::{ArchiveBuilder, TarArchiver};
use crate::config::NodeConfig;
use crate::proxy::ForwardingProxy;
use crate::routing::Router;
use crate::storage::Storage;

/// Everything a session needs, built once at startup.
pub struct NodeContext {
    pub config: NodeConfig,
    pub router: Router,
    pub storage: Storage,
    pub proxy: ForwardingProxy,
}

impl NodeContext {
    pub fn new(config: NodeConfig) -> Self {
        Self::with_archiver(config, Arc::new(TarArchiver))
    }

    pub fn with_archiver(config: NodeConfig, archiver: Arc<dyn ArchiveBuilder>) -> Self {
        Self {
            router: Router::new(&config.home),
            storage: Storage::new(&config, archiver),
            proxy: ForwardingProxy::new(&config),
            config,
        }
    }

    pub fn shard(&self) -> ShardId {
        self.config.shard
    }
}
