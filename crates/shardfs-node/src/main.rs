//! shardfs node binary
//!
//! ## Usage
//!
//! ```bash
//! # A four-node cluster on localhost, default ports 8080-8083
//! shardfs-node --shard S2 &
//! shardfs-node --shard S3 &
//! shardfs-node --shard S4 &
//! shardfs-node --shard S1
//!
//! # Shards elsewhere
//! shardfs-node --shard S1 --peer S2=10.0.0.2:8081 --peer S3=10.0.0.3:8082
//!
//! # From a config file
//! shardfs-node --config ~/.config/shardfs/node.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use shardfs_node::config::expand_path;
use shardfs_node::constants::DEFAULT_CONFIG_FILE;
use shardfs_node::{NodeConfig, NodeServer, PeerConfig};
use shardfs_proto::ShardId;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// One node of a shardfs cluster.
#[derive(Parser, Debug)]
#[command(name = "shardfs-node")]
#[command(about = "Storage node for the shardfs distributed file store")]
struct Args {
    /// TOML config file (default: ~/.config/shardfs/node.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Role to play: S1 (public), S2 (pdf), S3 (txt) or S4 (zip)
    #[arg(long)]
    shard: Option<ShardId>,

    /// Listen address (default: 127.0.0.1 on the shard's well-known port)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Directory holding the S1..S4 namespace roots (default: $HOME)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Where archives are built before transfer
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Address of another node, repeatable
    #[arg(long = "peer", value_name = "SHARD=HOST:PORT")]
    peers: Vec<PeerConfig>,
}

fn build_config(args: Args) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let default = expand_path(Path::new(DEFAULT_CONFIG_FILE));
            if default.exists() {
                NodeConfig::load(&default)?
            } else {
                NodeConfig::default()
            }
        }
    };

    if let Some(shard) = args.shard {
        config.shard = shard;
    }
    if let Some(listen) = args.listen {
        config.listen = Some(listen);
    }
    if let Some(home) = args.home {
        config.home = expand_path(&home);
    }
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = expand_path(&temp_dir);
    }
    for peer in args.peers {
        config.set_peer(peer);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match build_config(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Starting {} on {}...",
        config.shard,
        config.listen_addr()
    );
    let server = match NodeServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
