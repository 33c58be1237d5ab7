//! Leaf storage operations against the node's own namespace.
//!
//! Each operation runs the responder side of one exchange on a [`Wire`].
//! Errors are returned, not sent; the caller decides whether to report them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shardfs_proto::{
    Direction, FileClass, Message, ProtoError, ProtoResult, PumpFailure, TransferSession, Wire,
    validate_size,
};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::archive::ArchiveBuilder;
use crate::config::NodeConfig;
use crate::namespace::Namespace;

/// File store for one node.
pub struct Storage {
    namespace: Namespace,
    archiver: Arc<dyn ArchiveBuilder>,
    temp_dir: PathBuf,
    ack_timeout: Duration,
    final_ack_timeout: Duration,
}

impl Storage {
    pub fn new(config: &NodeConfig, archiver: Arc<dyn ArchiveBuilder>) -> Self {
        Self {
            namespace: Namespace::new(config.shard, &config.home),
            archiver,
            temp_dir: config.temp_dir.clone(),
            ack_timeout: config.ack_timeout(),
            final_ack_timeout: config.final_ack_timeout(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The class this node lists and archives.
    pub fn class(&self) -> FileClass {
        self.namespace.shard().class()
    }

    /// Responder side of an upload into `target`.
    ///
    /// Parent directories are created before `READY` is sent. A payload that
    /// ends short leaves nothing behind.
    pub async fn receive_upload<S>(&self, wire: &mut Wire<S>, target: &Path) -> ProtoResult<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ProtoError::io("Failed to create directory", e))?;
        }
        if fs::metadata(target).await.is_ok_and(|m| m.is_dir()) {
            return Err(ProtoError::path_rejected(format!(
                "Invalid path, {} is a directory",
                target.display()
            )));
        }

        wire.send(&Message::Ready).await?;
        let len = wire.recv_size().await.map_err(ProtoError::from_requester)?;
        wire.send(&Message::SizeAck).await?;

        self.store_payload(wire, target, len).await?;
        wire.send(&Message::Success).await?;

        tracing::info!("stored {} ({} bytes)", target.display(), len);
        Ok(len)
    }

    /// Write exactly `len` payload bytes from `wire` to `target`.
    async fn store_payload<S>(&self, wire: &mut Wire<S>, target: &Path, len: u64) -> ProtoResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = TransferSession::new(len, Direction::Upload);

        let mut file = match File::create(target).await {
            Ok(file) => file,
            Err(e) => {
                session.drain(wire.stream_mut()).await?;
                return Err(ProtoError::io("Failed to create file", e));
            }
        };

        let result = session.pump(wire.stream_mut(), &mut file).await;
        let failure = match result {
            Ok(_) => match file.sync_all().await {
                Ok(()) => return Ok(()),
                Err(e) => PumpFailure::Sink(e),
            },
            Err(failure) => failure,
        };

        drop(file);
        remove_partial(target).await;

        match failure {
            PumpFailure::Sink(e) => {
                session.drain(wire.stream_mut()).await?;
                Err(ProtoError::io("File receive error", e))
            }
            other => {
                let err = ProtoError::from(other);
                tracing::warn!(
                    "{} to {} abandoned after {} of {} bytes: {}",
                    session.direction(),
                    target.display(),
                    session.transferred(),
                    session.declared(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Responder side of a download of `path`.
    pub async fn send_file<S>(&self, wire: &mut Wire<S>, path: &Path) -> ProtoResult<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut file = File::open(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProtoError::not_found(path.display().to_string()),
            _ => ProtoError::io("Failed to open file", e),
        })?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| ProtoError::io("Failed to read file size", e))?;
        if meta.is_dir() {
            return Err(ProtoError::path_rejected(format!(
                "Invalid path, {} is a directory",
                path.display()
            )));
        }
        let len = validate_size(meta.len())?;

        wire.send(&Message::Size(len)).await?;
        match timeout(self.ack_timeout, wire.recv()).await {
            Err(_) => return Err(ProtoError::handshake("Timed out waiting for SIZE_ACK")),
            Ok(Ok(Message::SizeAck)) => {}
            Ok(Ok(Message::Error(msg))) => return Err(ProtoError::Aborted(msg)),
            Ok(Ok(other)) => {
                return Err(ProtoError::handshake(format!(
                    "Size acknowledgment failed, got {other:?}"
                )));
            }
            Ok(Err(e)) => return Err(e),
        }

        let mut session = TransferSession::new(len, Direction::Download);
        session
            .pump(&mut file, wire.stream_mut())
            .await
            .map_err(|failure| match failure {
                // The requester is owed bytes we can no longer produce
                PumpFailure::Source(e) => {
                    tracing::warn!("reading {} failed mid-transfer: {}", path.display(), e);
                    ProtoError::Truncated {
                        expected: len,
                        transferred: session.transferred(),
                    }
                }
                other => other.into(),
            })?;

        match timeout(self.final_ack_timeout, wire.recv()).await {
            Ok(Ok(Message::Success)) => {}
            Ok(Ok(other)) => tracing::debug!("closing ack was {:?}", other),
            Ok(Err(e)) => tracing::debug!("no closing ack: {}", e),
            Err(_) => tracing::debug!("closing ack timed out"),
        }

        tracing::info!("sent {} ({} bytes)", path.display(), len);
        Ok(len)
    }

    /// Delete one file.
    pub async fn remove(&self, path: &Path) -> ProtoResult<()> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(ProtoError::path_rejected(format!(
                    "Invalid path, {} is a directory",
                    path.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProtoError::not_found(path.display().to_string()));
            }
            Err(e) => return Err(ProtoError::io("Failed to remove file", e)),
        }
        fs::remove_file(path)
            .await
            .map_err(|e| ProtoError::io("Failed to remove file", e))?;
        tracing::info!("removed {}", path.display());
        Ok(())
    }

    /// Names of this node's class directly inside `dir`, sorted.
    ///
    /// A missing directory is an empty listing.
    pub async fn list(&self, dir: &Path) -> ProtoResult<Vec<String>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(ProtoError::io("Failed to list directory", e)),
        };

        let class = self.class();
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProtoError::io("Failed to list directory", e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && FileClass::of_filename(&name) == Some(class) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Build an archive of `class` under the namespace and send it like a download.
    ///
    /// The archive is deleted once the transfer ends, however it ends.
    pub async fn send_archive<S>(&self, wire: &mut Wire<S>, class: FileClass) -> ProtoResult<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let archive = self
            .archiver
            .build(&self.namespace.canonical_root(), class, &self.temp_dir)
            .await?;
        self.send_file(wire, archive.path()).await
    }
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => tracing::debug!("removed partial upload {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove partial upload {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarArchiver;
    use shardfs_proto::{ShardId, requester};
    use tokio::io::{AsyncWriteExt, duplex};

    fn storage(home: &Path, shard: ShardId) -> Storage {
        let mut config = NodeConfig::for_shard(shard);
        config.home = home.to_path_buf();
        config.temp_dir = home.to_path_buf();
        config.ack_timeout_ms = 200;
        config.final_ack_timeout_ms = 50;
        Storage::new(&config, Arc::new(TarArchiver))
    }

    #[tokio::test]
    async fn upload_then_download() {
        let home = tempfile::tempdir().unwrap();
        let store = Arc::new(storage(home.path(), ShardId::S2));
        let target = home.path().join("S2/docs/a.pdf");
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let (a, b) = duplex(8192);
        let responder = {
            let store = store.clone();
            let target = target.clone();
            tokio::spawn(async move {
                let mut wire = Wire::new(b);
                store.receive_upload(&mut wire, &target).await
            })
        };
        let mut client = Wire::new(a);
        let mut src: &[u8] = &payload;
        requester::send_payload(&mut client, &mut src, payload.len() as u64)
            .await
            .unwrap();
        assert_eq!(responder.await.unwrap().unwrap(), payload.len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), payload);

        let (a, b) = duplex(8192);
        let responder = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut wire = Wire::new(b);
                store.send_file(&mut wire, &target).await
            })
        };
        let mut client = Wire::new(a);
        let len = requester::await_size(&mut client).await.unwrap();
        let mut got = Vec::new();
        requester::receive_into(&mut client, len, &mut got).await.unwrap();
        responder.await.unwrap().unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn zero_size_upload_is_rejected_before_payload() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S1);
        let target = home.path().join("S1/a.c");

        let (a, b) = duplex(1024);
        let mut client = Wire::new(a);
        let mut server = Wire::new(b);
        client.send(&Message::Size(0)).await.unwrap();

        let err = store.receive_upload(&mut server, &target).await.unwrap_err();
        assert!(matches!(err, ProtoError::SizeInvalid(_)));
        assert!(err.reportable() && !err.is_fatal());
        assert_eq!(client.recv().await.unwrap(), Message::Ready);
    }

    #[tokio::test]
    async fn disconnect_mid_upload_removes_partial() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S1);
        let target = home.path().join("S1/part.c");

        let (a, b) = duplex(1024);
        let client = tokio::spawn(async move {
            let mut wire = Wire::new(a);
            wire.expect(Message::Ready).await.unwrap();
            wire.send(&Message::Size(1000)).await.unwrap();
            wire.expect(Message::SizeAck).await.unwrap();
            wire.stream_mut().write_all(&[7u8; 300]).await.unwrap();
            wire.stream_mut().flush().await.unwrap();
            // dropped with 700 bytes outstanding
        });

        let mut server = Wire::new(b);
        let err = store.receive_upload(&mut server, &target).await.unwrap_err();
        client.await.unwrap();
        assert!(matches!(
            err,
            ProtoError::Truncated {
                expected: 1000,
                transferred: 300
            }
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S3);
        let (_a, b) = duplex(64);
        let mut server = Wire::new(b);
        let err = store
            .send_file(&mut server, &home.path().join("S3/none.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtoError::NotFound(_)));
        assert!(err.reportable());
    }

    #[tokio::test]
    async fn empty_file_is_not_served() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S3);
        let path = home.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();
        let (_a, b) = duplex(64);
        let mut server = Wire::new(b);
        assert!(matches!(
            store.send_file(&mut server, &path).await,
            Err(ProtoError::SizeInvalid(_))
        ));
    }

    #[tokio::test]
    async fn silent_requester_times_out() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S1);
        let path = home.path().join("slow.c");
        std::fs::write(&path, b"int x;").unwrap();

        let (_a, b) = duplex(64);
        let mut server = Wire::new(b);
        let err = store.send_file(&mut server, &path).await.unwrap_err();
        assert!(matches!(err, ProtoError::Handshake(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn list_filters_by_class() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S1);
        let dir = home.path().join("S1/src");
        std::fs::create_dir_all(dir.join("sub.c")).unwrap();
        std::fs::write(dir.join("b.c"), b"1").unwrap();
        std::fs::write(dir.join("a.c"), b"1").unwrap();
        std::fs::write(dir.join("notes.txt"), b"1").unwrap();
        std::fs::write(dir.join("Makefile"), b"1").unwrap();

        assert_eq!(store.list(&dir).await.unwrap(), vec!["a.c", "b.c"]);
        assert!(store.list(&dir.join("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_reports_missing() {
        let home = tempfile::tempdir().unwrap();
        let store = storage(home.path(), ShardId::S4);
        let path = home.path().join("S4/a.zip");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"PK").unwrap();

        store.remove(&path).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(store.remove(&path).await, Err(ProtoError::NotFound(_))));
    }
}
