//! Node configuration.
//!
//! Loaded from TOML, then overridden by command-line flags:
//!
//! ```toml
//! shard = "S1"
//! listen = "127.0.0.1:8080"
//! home = "~"
//!
//! [[peers]]
//! shard = "S2"
//! addr = "127.0.0.1:8081"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shardfs_proto::ShardId;
use thiserror::Error;

use crate::constants::{ACK_TIMEOUT, DEFAULT_BIND_ADDRESS, FINAL_ACK_TIMEOUT};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid peer {0:?}, expected SHARD=HOST:PORT")]
    InvalidPeer(String),
}

/// Address of another node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerConfig {
    pub shard: ShardId,
    pub addr: SocketAddr,
}

impl std::str::FromStr for PeerConfig {
    type Err = ConfigError;

    /// Parse `S2=127.0.0.1:8081`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPeer(s.to_string());
        let (shard, addr) = s.split_once('=').ok_or_else(invalid)?;
        Ok(Self {
            shard: shard.trim().parse().map_err(|_| invalid())?,
            addr: addr.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Settings for one node.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Which of the four roles this process plays.
    pub shard: ShardId,
    /// Listen address; defaults to the shard's well-known port on localhost.
    pub listen: Option<SocketAddr>,
    /// Directory holding the `S1`..`S4` namespace roots.
    pub home: PathBuf,
    /// Where archives are built before transfer.
    pub temp_dir: PathBuf,
    /// Remote shards, used by the public node.
    pub peers: Vec<PeerConfig>,
    pub ack_timeout_ms: u64,
    pub final_ack_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            shard: ShardId::S1,
            listen: None,
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            temp_dir: std::env::temp_dir(),
            peers: Vec::new(),
            ack_timeout_ms: ACK_TIMEOUT.as_millis() as u64,
            final_ack_timeout_ms: FINAL_ACK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl NodeConfig {
    /// Defaults for `shard`.
    pub fn for_shard(shard: ShardId) -> Self {
        Self {
            shard,
            ..Self::default()
        }
    }

    /// Load from a TOML file; relative and `~` paths are expanded.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: NodeConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.home = expand_path(&config.home);
        config.temp_dir = expand_path(&config.temp_dir);
        Ok(config)
    }

    /// Address to bind.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen.unwrap_or_else(|| default_addr(self.shard))
    }

    /// Address of `shard`: a configured peer, else its well-known port on localhost.
    pub fn peer_addr(&self, shard: ShardId) -> SocketAddr {
        self.peers
            .iter()
            .rev()
            .find(|p| p.shard == shard)
            .map(|p| p.addr)
            .unwrap_or_else(|| default_addr(shard))
    }

    /// Add or replace the address of `peer.shard`.
    pub fn set_peer(&mut self, peer: PeerConfig) {
        self.peers.retain(|p| p.shard != peer.shard);
        self.peers.push(peer);
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn final_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.final_ack_timeout_ms)
    }
}

fn default_addr(shard: ShardId) -> SocketAddr {
    let ip = DEFAULT_BIND_ADDRESS
        .parse::<IpAddr>()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    SocketAddr::new(ip, shard.default_port())
}

/// Expand a leading `~` in `path`.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_class_table() {
        let config = NodeConfig::for_shard(ShardId::S3);
        assert_eq!(config.listen_addr().port(), 8082);
        assert_eq!(config.peer_addr(ShardId::S4).port(), 8083);
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.final_ack_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("node.toml");
        std::fs::write(
            &file,
            r#"
shard = "S1"
listen = "0.0.0.0:9000"
home = "/srv/shardfs"
ack_timeout_ms = 250

[[peers]]
shard = "S2"
addr = "10.0.0.2:9001"
"#,
        )
        .unwrap();

        let config = NodeConfig::load(&file).unwrap();
        assert_eq!(config.shard, ShardId::S1);
        assert_eq!(config.listen_addr(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.home, PathBuf::from("/srv/shardfs"));
        assert_eq!(config.peer_addr(ShardId::S2), "10.0.0.2:9001".parse().unwrap());
        assert_eq!(config.peer_addr(ShardId::S3).port(), 8082);
        assert_eq!(config.ack_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("node.toml");
        std::fs::write(&file, "shard = \"S9\"\n").unwrap();
        assert!(matches!(NodeConfig::load(&file), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            NodeConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn peer_flags() {
        let peer: PeerConfig = "S4=127.0.0.1:7004".parse().unwrap();
        assert_eq!(peer.shard, ShardId::S4);

        let mut config = NodeConfig::default();
        config.set_peer(peer);
        config.set_peer("S4=127.0.0.1:7005".parse().unwrap());
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peer_addr(ShardId::S4).port(), 7005);

        assert!("S4".parse::<PeerConfig>().is_err());
        assert!("S7=127.0.0.1:1".parse::<PeerConfig>().is_err());
    }

    #[test]
    fn tilde_expands() {
        let expanded = expand_path(Path::new("~/shardfs"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
