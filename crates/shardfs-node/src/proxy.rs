//! Forwarding proxy: relays a client exchange to the shard that owns the file.
//!
//! Each forwarded request opens a fresh connection, re-issues the request with
//! the translated path, and drives the handshake on both legs. Payload moves
//! through a bounded relay buffer and is never held whole.
//!
//! Failures on the shard leg are reported to the client and leave the client
//! session usable. Failures on the client leg while payload is in flight end
//! the session. The shard connection is closed whenever a method returns.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use shardfs_proto::{
    Direction, Message, ProtoError, ProtoResult, PumpFailure, Request, ShardId, TransferSession,
    Wire,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::NodeConfig;

/// Reinterpret an error from the shard leg for the client.
///
/// Error lines from the shard pass through verbatim; anything else names the
/// shard so the client can tell a relay failure from its own.
fn shard_leg(shard: ShardId, err: ProtoError) -> ProtoError {
    match err {
        ProtoError::Remote(msg) => ProtoError::Remote(msg),
        ProtoError::Upstream { .. } => err,
        other => ProtoError::upstream(shard, other.to_string()),
    }
}

/// Relay between the public node's clients and the remote shards.
#[derive(Debug, Clone)]
pub struct ForwardingProxy {
    peers: HashMap<ShardId, SocketAddr>,
    final_ack_timeout: Duration,
}

impl ForwardingProxy {
    pub fn new(config: &NodeConfig) -> Self {
        let peers = ShardId::REMOTES
            .iter()
            .map(|&shard| (shard, config.peer_addr(shard)))
            .collect();
        Self {
            peers,
            final_ack_timeout: config.final_ack_timeout(),
        }
    }

    /// Address used for `shard`.
    pub fn addr(&self, shard: ShardId) -> Option<SocketAddr> {
        self.peers.get(&shard).copied()
    }

    /// Open a connection to `shard` and send `request`.
    async fn open(&self, shard: ShardId, request: &Request) -> ProtoResult<Wire<TcpStream>> {
        let addr = self
            .addr(shard)
            .ok_or_else(|| ProtoError::upstream(shard, "No address configured"))?;
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            tracing::warn!("connect to {} at {} failed: {}", shard, addr, e);
            ProtoError::upstream(shard, "Could not connect to target server")
        })?;
        let _ = stream.set_nodelay(true);

        let mut wire = Wire::new(stream);
        wire.write_line(&request.to_string())
            .await
            .map_err(|e| shard_leg(shard, e))?;
        tracing::debug!("forwarded `{}` to {} at {}", request, shard, addr);
        Ok(wire)
    }

    /// Relay an upload whose client has just sent its command line.
    pub async fn forward_upload<C>(
        &self,
        client: &mut Wire<C>,
        shard: ShardId,
        path: String,
    ) -> ProtoResult<u64>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let mut upstream = self.open(shard, &Request::Upload(path)).await?;
        upstream.expect(Message::Ready).await.map_err(|e| match e {
            ProtoError::Remote(msg) => ProtoError::Remote(msg),
            other => ProtoError::upstream(shard, format!("Target server not ready: {other}")),
        })?;
        client.send(&Message::Ready).await?;

        let len = client.recv_size().await.map_err(ProtoError::from_requester)?;
        upstream
            .send(&Message::Size(len))
            .await
            .map_err(|e| shard_leg(shard, e))?;
        upstream
            .expect(Message::SizeAck)
            .await
            .map_err(|e| shard_leg(shard, e))?;
        client.send(&Message::SizeAck).await?;

        let mut session = TransferSession::new(len, Direction::Upload);
        match session.pump(client.stream_mut(), upstream.stream_mut()).await {
            Ok(_) => {}
            Err(PumpFailure::Sink(e)) => {
                tracing::warn!(
                    "{} dropped {} after {} of {} bytes: {}",
                    shard,
                    session.direction(),
                    session.transferred(),
                    session.declared(),
                    e
                );
                session.drain(client.stream_mut()).await?;
                return Err(ProtoError::upstream(shard, format!("File receive error: {e}")));
            }
            Err(failure) => return Err(failure.into()),
        }

        upstream
            .expect(Message::Success)
            .await
            .map_err(|e| shard_leg(shard, e))?;
        client.send(&Message::Success).await?;
        Ok(len)
    }

    /// Relay a download-shaped exchange: `DOWNLOAD` or `TAR`.
    pub async fn forward_download<C>(
        &self,
        client: &mut Wire<C>,
        shard: ShardId,
        request: Request,
    ) -> ProtoResult<u64>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let mut upstream = self.open(shard, &request).await?;
        let len = upstream
            .recv_size()
            .await
            .map_err(|e| shard_leg(shard, e))?;
        client.send(&Message::Size(len)).await?;

        match client.recv().await? {
            Message::SizeAck => {}
            Message::Error(msg) => return Err(ProtoError::Aborted(msg)),
            other => {
                return Err(ProtoError::handshake(format!(
                    "Size acknowledgment failed, got {other:?}"
                )));
            }
        }

        // From here on the client is owed `len` bytes; any failure ends its session
        let mut session = TransferSession::new(len, Direction::Download);
        if let Err(e) = upstream.send(&Message::SizeAck).await {
            tracing::warn!("{} lost before payload: {}", shard, e);
            return Err(ProtoError::Truncated {
                expected: len,
                transferred: 0,
            });
        }
        session
            .pump(upstream.stream_mut(), client.stream_mut())
            .await?;

        match timeout(self.final_ack_timeout, client.recv()).await {
            Ok(Ok(Message::Success)) => {
                if let Err(e) = upstream.send(&Message::Success).await {
                    tracing::debug!("closing ack not relayed to {}: {}", shard, e);
                }
            }
            Ok(Ok(other)) => tracing::debug!("closing ack was {:?}", other),
            Ok(Err(e)) => tracing::debug!("no closing ack: {}", e),
            Err(_) => tracing::debug!("closing ack timed out"),
        }
        Ok(len)
    }

    /// Relay a removal.
    pub async fn forward_remove(&self, shard: ShardId, path: String) -> ProtoResult<()> {
        let mut upstream = self.open(shard, &Request::Remove(path)).await?;
        upstream
            .expect(Message::Success)
            .await
            .map_err(|e| shard_leg(shard, e))
    }

    /// Ask `shard` for the names in one of its directories.
    pub async fn list_remote(&self, shard: ShardId, path: String) -> ProtoResult<Vec<String>> {
        let mut upstream = self.open(shard, &Request::List(path)).await?;
        upstream
            .read_listing()
            .await
            .map_err(|e| shard_leg(shard, e))
    }
}
