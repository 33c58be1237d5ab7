//! shardfs client library
//!
//! Talks to the public node (S1) over one persistent session. Every method
//! issues one command and waits for it to finish; commands never overlap.
//!
//! ```no_run
//! # async fn demo() -> Result<(), shardfs_client::ClientError> {
//! let mut client = shardfs_client::Client::connect("127.0.0.1:8080").await?;
//! client.upload("report.pdf".as_ref(), "~/S1/reports").await?;
//! for name in client.list("~/S1/reports").await? {
//!     println!("{name}");
//! }
//! client.exit().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use shardfs_proto::requester::{await_size, decline, receive_into, send_payload};
use shardfs_proto::{Command, Message, ProtoError, Wire, validate_size};
use tokio::fs::{self, File};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("{}: {source}", .path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Error line sent by the server.
    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Proto(ProtoError),
}

impl From<ProtoError> for ClientError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Remote(msg) => ClientError::Server(msg),
            other => ClientError::Proto(other),
        }
    }
}

/// Command arguments are whitespace-separated on the wire.
fn single_token(arg: &str) -> Result<&str, ClientError> {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        return Err(ClientError::InvalidArgument(format!(
            "{arg:?} must be non-empty and contain no whitespace"
        )));
    }
    Ok(arg)
}

/// Last path component of a server path.
fn base_name(path: &str) -> Result<&str, ClientError> {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(ClientError::InvalidArgument(format!("{path:?} names no file"))),
    }
}

/// A session with the public node.
pub struct Client {
    wire: Wire<TcpStream>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        let _ = stream.set_nodelay(true);
        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!("connected to {}", peer);
        }
        Ok(Self {
            wire: Wire::new(stream),
        })
    }

    async fn send(&mut self, command: Command) -> Result<(), ClientError> {
        tracing::debug!("-> {}", command);
        self.wire.write_line(&command.to_string()).await?;
        Ok(())
    }

    /// Upload `local` into `server_dir`, keeping its file name.
    pub async fn upload(&mut self, local: &Path, server_dir: &str) -> Result<u64, ClientError> {
        let local_arg = local.to_string_lossy().into_owned();
        single_token(&local_arg)?;
        single_token(server_dir)?;

        let local_err = |source: io::Error| ClientError::Local {
            path: local.to_path_buf(),
            source,
        };
        let meta = fs::metadata(local).await.map_err(local_err)?;
        if !meta.is_file() {
            return Err(ClientError::InvalidArgument(format!(
                "{} is not a regular file",
                local.display()
            )));
        }
        let len = validate_size(meta.len())?;
        let mut file = File::open(local).await.map_err(local_err)?;

        self.send(Command::Upload {
            local: local_arg,
            server_dir: server_dir.to_string(),
        })
        .await?;
        send_payload(&mut self.wire, &mut file, len).await?;
        Ok(len)
    }

    /// Download `path` into `dest_dir`, returning the local file written.
    ///
    /// A transfer that fails midway leaves the partial file in place.
    pub async fn download(&mut self, path: &str, dest_dir: &Path) -> Result<PathBuf, ClientError> {
        single_token(path)?;
        let dest = dest_dir.join(base_name(path)?);

        self.send(Command::Download {
            path: path.to_string(),
        })
        .await?;
        self.receive_file(&dest).await?;
        Ok(dest)
    }

    /// Delete `path` on whichever node holds it.
    pub async fn remove(&mut self, path: &str) -> Result<(), ClientError> {
        single_token(path)?;
        self.send(Command::Remove {
            path: path.to_string(),
        })
        .await?;
        self.wire.expect(Message::Success).await?;
        Ok(())
    }

    /// Names in `dir` across all nodes, grouped by class.
    pub async fn list(&mut self, dir: &str) -> Result<Vec<String>, ClientError> {
        single_token(dir)?;
        self.send(Command::List {
            dir: dir.to_string(),
        })
        .await?;
        Ok(self.wire.read_listing().await?)
    }

    /// Download a tar of every file of `class` (`c`, `pdf` or `txt`) to `dest`.
    pub async fn download_archive(&mut self, class: &str, dest: &Path) -> Result<u64, ClientError> {
        single_token(class)?;
        self.send(Command::Archive {
            class: class.to_string(),
        })
        .await?;
        self.receive_file(dest).await
    }

    /// End the session.
    pub async fn exit(mut self) -> Result<(), ClientError> {
        self.send(Command::Exit).await?;
        self.wire.shutdown().await;
        Ok(())
    }

    /// Receive a download-shaped reply into `dest`.
    async fn receive_file(&mut self, dest: &Path) -> Result<u64, ClientError> {
        let len = await_size(&mut self.wire).await?;

        let opened = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
            _ => Ok(()),
        };
        let opened = match opened {
            Ok(()) => File::create(dest).await,
            Err(e) => Err(e),
        };
        let mut file = match opened {
            Ok(file) => file,
            Err(source) => {
                let reason = ProtoError::io(
                    "Failed to create local file",
                    io::Error::new(source.kind(), source.to_string()),
                );
                decline(&mut self.wire, &reason).await;
                return Err(ClientError::Local {
                    path: dest.to_path_buf(),
                    source,
                });
            }
        };

        let moved = receive_into(&mut self.wire, len, &mut file).await?;
        tracing::debug!("received {} bytes into {}", moved, dest.display());
        Ok(moved)
    }
}
