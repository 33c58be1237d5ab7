//! Archive bundling for `downltar` / `TAR`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shardfs_proto::{FileClass, ProtoError, ProtoResult};
use walkdir::WalkDir;

use crate::constants::ARCHIVE_PREFIX;

/// An archive in temp storage, deleted when dropped.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
    members: usize,
}

impl TempArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of files bundled.
    pub fn members(&self) -> usize {
        self.members
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        // Blocking, but a single unlink
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("removed archive {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove archive {}: {}", self.path.display(), e),
        }
    }
}

/// Builds an archive of every file of one class under a namespace root.
#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    async fn build(&self, root: &Path, class: FileClass, temp_dir: &Path)
    -> ProtoResult<TempArchive>;
}

/// Tar archives via the `tar` crate, members named relative to the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiver;

#[async_trait]
impl ArchiveBuilder for TarArchiver {
    async fn build(
        &self,
        root: &Path,
        class: FileClass,
        temp_dir: &Path,
    ) -> ProtoResult<TempArchive> {
        let root = root.to_path_buf();
        let path = temp_dir.join(format!(
            "{ARCHIVE_PREFIX}-{class}-{}.tar",
            uuid::Uuid::new_v4()
        ));

        tokio::task::spawn_blocking(move || build_tar(&root, class, path))
            .await
            .map_err(|e| ProtoError::io("archive task", std::io::Error::other(e)))?
    }
}

fn build_tar(root: &Path, class: FileClass, path: PathBuf) -> ProtoResult<TempArchive> {
    let file = std::fs::File::create(&path)
        .map_err(|e| ProtoError::io(format!("create {}", path.display()), e))?;
    // Dropping the guard on any error below removes the partial archive
    let mut archive = TempArchive { path, members: 0 };
    let mut builder = tar::Builder::new(file);

    if root.is_dir() {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                ProtoError::io(format!("walk {}", root.display()), std::io::Error::other(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if FileClass::of_filename(&name) != Some(class) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(|e| ProtoError::io(format!("add {}", entry.path().display()), e))?;
            archive.members += 1;
        }
    }

    builder
        .into_inner()
        .and_then(|file| file.sync_all())
        .map_err(|e| ProtoError::io("Failed to create tar file", e))?;

    tracing::info!(
        "built {} archive with {} files at {}",
        class,
        archive.members,
        archive.path.display()
    );
    Ok(archive)
}
