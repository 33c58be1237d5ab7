//! Mapping between namespace paths and the node's directory on disk.

use std::path::{Component, Path, PathBuf};

use shardfs_proto::{ProtoError, ProtoResult, ShardId};

use crate::routing::Router;

/// A node's namespace, rooted at `<home>/<marker>`.
///
/// Paths are accepted in any spelling the [`Router`] understands for this
/// node's own marker. `..` components are refused.
#[derive(Debug, Clone)]
pub struct Namespace {
    shard: ShardId,
    root: PathBuf,
    router: Router,
}

impl Namespace {
    pub fn new(shard: ShardId, home: &Path) -> Self {
        Self {
            shard,
            root: home.join(shard.marker()),
            router: Router::new(home),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it is missing.
    pub async fn ensure_root(&self) -> ProtoResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ProtoError::io(format!("create {}", self.root.display()), e))
    }

    /// Resolve `path` to a location under the root.
    pub fn resolve(&self, path: &str) -> ProtoResult<PathBuf> {
        let marker = self.shard.marker();
        let suffix = self.router.suffix(path, self.shard).ok_or_else(|| {
            ProtoError::path_rejected(format!(
                "Invalid path, must start with ~/{marker} or ~{marker}"
            ))
        })?;

        let mut resolved = self.root.clone();
        for component in Path::new(suffix).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(ProtoError::path_rejected(format!(
                        "Invalid path, escapes ~/{marker}: {path}"
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Resolve `path` and require it to name a file inside the root.
    pub fn resolve_file(&self, path: &str) -> ProtoResult<PathBuf> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(ProtoError::path_rejected(format!(
                "Invalid path, no file name: {path}"
            )));
        }
        Ok(resolved)
    }

    /// Canonical root, used as the base of archive walks so members are named relative to it.
    pub fn canonical_root(&self) -> PathBuf {
        dunce::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }
}
