//! BullyScale Configuration
//!
//! Static configuration for a node: its identity, the fixed peer map of
//! the whole cluster (including itself) and the protocol timings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::state::NodeId;

/// Main BullyScale configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BullyScaleConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster configuration
    pub cluster: ClusterConfig,

    /// Protocol timings
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Numeric node identifier (0 is reserved for "unknown")
    #[serde(default)]
    pub id: NodeId,

    /// Data directory for the persisted state file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Explicit state file path (defaults to `<data_dir>/node-<id>.json`)
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Every node of the cluster, including this one
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// One entry of the static peer map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    pub address: String,
}

/// Protocol timings, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay before the heartbeat monitor starts probing
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,

    /// Interval between heartbeat ticks
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Timeout of a single heartbeat probe
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// How long a campaign waits for a higher peer to answer
    #[serde(default = "default_election_timeout_ms")]
    pub election_timeout_ms: u64,

    /// Timeout for election, coordinator and state-replacement calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay before the startup synchronization runs
    #[serde(default = "default_sync_delay_ms")]
    pub sync_delay_ms: u64,

    /// Timeout of the state fetch issued by the synchronizer
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_startup_grace_ms() -> u64 {
    5000
}

fn default_heartbeat_interval_ms() -> u64 {
    3000
}

fn default_heartbeat_timeout_ms() -> u64 {
    2000
}

fn default_election_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_sync_delay_ms() -> u64 {
    5000
}

fn default_sync_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_grace_ms: default_startup_grace_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            election_timeout_ms: default_election_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            sync_delay_ms: default_sync_delay_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BullyScaleConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        Self::load(path, None)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: BullyScaleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, optionally overriding `node.id`, then validate.
    /// The file may leave `node.id` out when an override is given.
    pub fn load(path: &std::path::Path, node_id: Option<NodeId>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: BullyScaleConfig = toml::from_str(&content)?;
        if let Some(id) = node_id {
            config.node.id = id;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id == 0 {
            return Err(crate::Error::Config("node.id must be a non-zero integer".into()));
        }

        if self.cluster.peers.is_empty() {
            return Err(crate::Error::Config("cluster.peers cannot be empty".into()));
        }

        let mut seen = BTreeMap::new();
        for peer in &self.cluster.peers {
            if peer.id == 0 {
                return Err(crate::Error::Config("peer id 0 is reserved".into()));
            }
            if peer.address.is_empty() {
                return Err(crate::Error::Config(format!(
                    "peer {} has an empty address",
                    peer.id
                )));
            }
            if seen.insert(peer.id, ()).is_some() {
                return Err(crate::Error::Config(format!(
                    "peer {} is listed more than once",
                    peer.id
                )));
            }
        }

        if !seen.contains_key(&self.node.id) {
            return Err(crate::Error::Config(format!(
                "node {} is missing from cluster.peers",
                self.node.id
            )));
        }

        let t = &self.timing;
        let timings = [
            ("startup_grace_ms", t.startup_grace_ms),
            ("heartbeat_interval_ms", t.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", t.heartbeat_timeout_ms),
            ("election_timeout_ms", t.election_timeout_ms),
            ("request_timeout_ms", t.request_timeout_ms),
            ("sync_delay_ms", t.sync_delay_ms),
            ("sync_timeout_ms", t.sync_timeout_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, ms)| *ms == 0) {
            return Err(crate::Error::Config(format!("timing.{} must be non-zero", name)));
        }

        Ok(())
    }

    /// The static ID -> address map of the whole cluster
    pub fn peer_map(&self) -> BTreeMap<NodeId, String> {
        self.cluster
            .peers
            .iter()
            .map(|p| (p.id, p.address.clone()))
            .collect()
    }

    /// Address this node listens on (its own peer-map entry)
    pub fn listen_address(&self) -> Option<&str> {
        self.cluster
            .peers
            .iter()
            .find(|p| p.id == self.node.id)
            .map(|p| p.address.as_str())
    }

    /// Path of the persisted state file
    pub fn state_file(&self) -> PathBuf {
        match &self.node.state_file {
            Some(path) => path.clone(),
            None => self.node.data_dir.join(format!("node-{}.json", self.node.id)),
        }
    }

    /// Render a sample configuration for a local cluster of `nodes` nodes
    pub fn sample(node_id: NodeId, nodes: u64, base_port: u16) -> String {
        let mut out = format!(
            r#"# BullyScale Configuration
# Generated configuration file

[node]
id = {node_id}
data_dir = "./data"

"#
        );

        for id in 1..=nodes {
            out.push_str(&format!(
                "[[cluster.peers]]\nid = {}\naddress = \"127.0.0.1:{}\"\n\n",
                id,
                base_port as u64 + id
            ));
        }

        out.push_str(
            r#"[timing]
startup_grace_ms = 5000
heartbeat_interval_ms = 3000
heartbeat_timeout_ms = 2000
election_timeout_ms = 3000
request_timeout_ms = 2000
sync_delay_ms = 5000
sync_timeout_ms = 3000

[logging]
level = "info"
"#,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_NODES: &str = r#"
[node]
id = 2
data_dir = "/var/lib/bullyscale"

[[cluster.peers]]
id = 1
address = "10.0.0.1:8081"

[[cluster.peers]]
id = 2
address = "10.0.0.2:8082"

[[cluster.peers]]
id = 3
address = "10.0.0.3:8083"
"#;

    #[test]
    fn test_parse_config() {
        let config = BullyScaleConfig::from_str(THREE_NODES).unwrap();
        assert_eq!(config.node.id, 2);
        assert_eq!(config.peer_map().len(), 3);
        assert_eq!(config.listen_address(), Some("10.0.0.2:8082"));
        assert_eq!(
            config.state_file(),
            PathBuf::from("/var/lib/bullyscale/node-2.json")
        );
        assert_eq!(config.timing.heartbeat_interval(), Duration::from_secs(3));
        assert_eq!(config.timing.election_timeout(), Duration::from_secs(3));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_node_id_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bullyscale.toml");
        std::fs::write(&path, THREE_NODES.replace("id = 2\ndata_dir", "data_dir")).unwrap();

        // Without an id in the file the override is mandatory
        assert!(BullyScaleConfig::load(&path, None).is_err());

        let config = BullyScaleConfig::load(&path, Some(3)).unwrap();
        assert_eq!(config.listen_address(), Some("10.0.0.3:8083"));

        let err = BullyScaleConfig::load(&path, Some(7)).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_peer() {
        let toml = r#"
[node]
id = 1

[[cluster.peers]]
id = 1
address = "127.0.0.1:8081"

[[cluster.peers]]
id = 1
address = "127.0.0.1:8082"
"#;
        assert!(BullyScaleConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_rejects_missing_id() {
        let toml = r#"
[node]
data_dir = "./data"

[[cluster.peers]]
id = 1
address = "127.0.0.1:8081"
"#;
        assert!(BullyScaleConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = BullyScaleConfig::sample(1, 3, 8080);
        let config = BullyScaleConfig::from_str(&sample).unwrap();
        assert_eq!(config.peer_map().get(&3).map(String::as_str), Some("127.0.0.1:8083"));
        assert_eq!(config.timing.sync_delay_ms, 5000);
    }
}
