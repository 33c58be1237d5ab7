//! Accept loop: one task per connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use shardfs_proto::Wire;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::config::NodeConfig;
use crate::context::NodeContext;
use crate::session::run_session;
use crate::shard::serve_request;

/// A bound node, ready to serve.
pub struct NodeServer {
    listener: TcpListener,
    ctx: Arc<NodeContext>,
}

impl NodeServer {
    /// Create the namespace root and bind the listen address.
    pub async fn bind(config: NodeConfig) -> io::Result<Self> {
        let ctx = Arc::new(NodeContext::new(config));
        ctx.storage
            .namespace()
            .ensure_root()
            .await
            .map_err(io::Error::other)?;

        let listener = TcpListener::bind(ctx.config.listen_addr()).await?;
        Ok(Self { listener, ctx })
    }

    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until the listener fails.
    pub async fn run(self) -> io::Result<()> {
        let shard = self.ctx.shard();
        tracing::info!(
            "{} serving {} on {}",
            shard,
            self.ctx.storage.namespace().root().display(),
            self.local_addr()?
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };

            let ctx = self.ctx.clone();
            let span = tracing::info_span!("conn", node = %shard, %peer);
            tokio::spawn(handle_connection(ctx, stream).instrument(span));
        }
    }
}

async fn handle_connection(ctx: Arc<NodeContext>, stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let mut wire = Wire::new(stream);
    if ctx.shard().is_public() {
        run_session(&ctx, &mut wire).await;
    } else {
        serve_request(&ctx, &mut wire).await;
    }
    wire.shutdown().await;
}
