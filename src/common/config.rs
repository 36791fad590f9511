//! Configuration for replifs nodes and groups

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration, loadable from `replifs.toml` and `REPLIFS_*` env vars.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Group-level settings (shared by all members)
    #[serde(default)]
    pub group: GroupConfig,

    /// Per-node settings
    #[serde(default)]
    pub node: NodeConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings shared by every member of one replication group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group name joined by every member
    #[serde(default = "default_group_name")]
    pub name: String,

    /// Number of members started by `replifs-node serve`
    #[serde(default = "default_nodes")]
    pub nodes: usize,

    /// Address the per-node HTTP listeners bind on
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// First HTTP port; member i listens on base_port + i
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

fn default_group_name() -> String {
    "data-cluster".to_string()
}
fn default_nodes() -> usize {
    3
}
fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}
fn default_base_port() -> u16 {
    7000
}

impl GroupConfig {
    /// HTTP port for member `index`. Fails instead of wrapping when the
    /// offset pushes the port past `u16::MAX`.
    pub fn member_port(&self, index: usize) -> crate::common::Result<u16> {
        u16::try_from(index)
            .ok()
            .and_then(|offset| self.base_port.checked_add(offset))
            .ok_or_else(|| {
                crate::common::Error::InvalidConfig(format!(
                    "member {} overflows port range (base_port {})",
                    index, self.base_port
                ))
            })
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: default_group_name(),
            nodes: default_nodes(),
            bind_host: default_bind_host(),
            base_port: default_base_port(),
        }
    }
}

/// Per-node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root directory for the record store and blob area
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bound on the quorum wait after a mutation broadcast
    #[serde(default = "default_replication_timeout")]
    pub replication_timeout_secs: u64,

    /// Bound on distributed lock acquisition
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Bound on join-time state transfer; past it the node goes active
    /// with whatever partial state it received
    #[serde(default = "default_state_transfer_timeout")]
    pub state_transfer_timeout_secs: u64,

    /// Session token lifetime
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./replifs-data")
}
fn default_replication_timeout() -> u64 {
    10
}
fn default_lock_timeout() -> u64 {
    5
}
fn default_state_transfer_timeout() -> u64 {
    30
}
fn default_session_ttl() -> u64 {
    3600
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            replication_timeout_secs: default_replication_timeout(),
            lock_timeout_secs: default_lock_timeout(),
            state_transfer_timeout_secs: default_state_transfer_timeout(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

impl NodeConfig {
    pub fn replication_timeout(&self) -> Duration {
        Duration::from_secs(self.replication_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn state_transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.state_transfer_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Config {
    /// Load config from `replifs.toml` (if present) merged with `REPLIFS_*`
    /// environment variables. Missing sources fall back to defaults.
    pub fn load() -> Self {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("replifs").required(false))
            .add_source(config::Environment::with_prefix("REPLIFS").separator("__"));

        match builder.build().and_then(|c| c.try_deserialize()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.group.name, "data-cluster");
        assert_eq!(cfg.group.nodes, 3);
        assert_eq!(cfg.node.replication_timeout_secs, 10);
        assert_eq!(cfg.node.state_transfer_timeout_secs, 30);
        assert_eq!(
            cfg.node.replication_timeout(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_member_port_bounds() {
        let group = GroupConfig::default();
        assert_eq!(group.member_port(0).unwrap(), 7000);
        assert_eq!(group.member_port(2).unwrap(), 7002);

        let near_max = GroupConfig {
            base_port: u16::MAX - 1,
            ..GroupConfig::default()
        };
        assert_eq!(near_max.member_port(1).unwrap(), u16::MAX);
        assert!(near_max.member_port(2).is_err());
        assert!(group.member_port(usize::from(u16::MAX) + 1).is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let cfg = Config::default();
        let s = toml_like(&cfg);
        assert!(s.contains("data-cluster"));
    }

    fn toml_like(cfg: &Config) -> String {
        serde_json::to_string(cfg).unwrap()
    }
}
