// Node configuration, loaded from TOML and then overridden from the CLI and
// `LAMPORTCAST_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use tom::{outbox::RetryPolicy, GroupConfig, NodeOptions, Peer, ProcessId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// 1..=group_size. Zero means "not set" and fails validation.
    pub process_id: u32,
    pub group_size: u32,
    pub bind: SocketAddr,
    /// Base URLs of every member. An entry on our own bind port is us and
    /// is ignored.
    pub peers: Vec<String>,
    pub initial_clock: u64,
    pub retry: RetryConfig,
    pub stall_timeout_ms: u64,
    pub health_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub simulated_latency_ms: Option<LatencyRange>,
    pub delivered_log_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            process_id: 0,
            group_size: 0,
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            peers: Vec::new(),
            initial_clock: 0,
            retry: RetryConfig::default(),
            stall_timeout_ms: 30_000,
            health_interval_ms: 1_000,
            request_timeout_ms: 5_000,
            simulated_latency_ms: None,
            delivered_log_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

/// Inclusive bounds, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min: u64,
    pub max: u64,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Configured peers minus this node's own entry
    pub fn remote_peers(&self) -> Vec<Peer> {
        let own_port = format!(":{}", self.bind.port());
        self.peers
            .iter()
            .map(|peer| peer.trim_end_matches('/'))
            .filter(|peer| !peer.ends_with(&own_port))
            .map(Peer::new)
            .collect()
    }

    /// Validated group membership
    pub fn group(&self) -> tom::Result<GroupConfig> {
        GroupConfig::new(ProcessId(self.process_id), self.group_size, self.remote_peers())
    }

    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            },
            initial_clock: self.initial_clock,
            stall_timeout: Duration::from_millis(self.stall_timeout_ms),
            health_interval: Duration::from_millis(self.health_interval_ms.max(1)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn simulated_latency(&self) -> Option<(Duration, Duration)> {
        self.simulated_latency_ms.map(|range| {
            let min = range.min.min(range.max);
            (Duration::from_millis(min), Duration::from_millis(range.max))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = NodeConfig::from_toml("process_id = 1\ngroup_size = 1\n").unwrap();
        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.delivered_log_capacity, 1024);
        assert!(config.simulated_latency().is_none());
        assert!(config.group().is_ok());
    }

    #[test]
    fn test_own_entry_is_filtered_out() {
        let config = NodeConfig {
            process_id: 2,
            group_size: 3,
            bind: "127.0.0.1:8082".parse().unwrap(),
            peers: vec![
                "http://127.0.0.1:8081".to_string(),
                "http://127.0.0.1:8082/".to_string(),
                "http://127.0.0.1:8083".to_string(),
            ],
            ..NodeConfig::default()
        };

        let peers: Vec<String> = config.remote_peers().into_iter().map(|p| p.address).collect();
        assert_eq!(peers, vec!["http://127.0.0.1:8081", "http://127.0.0.1:8083"]);

        let group = config.group().unwrap();
        assert_eq!(group.process_id(), ProcessId(2));
        assert_eq!(group.peers().len(), 2);
    }

    #[test]
    fn test_missing_ids_are_rejected() {
        let config = NodeConfig::default();
        assert!(matches!(config.group(), Err(tom::Error::InvalidMembership(_))));

        let config = NodeConfig {
            process_id: 4,
            group_size: 3,
            ..NodeConfig::default()
        };
        assert!(matches!(config.group(), Err(tom::Error::InvalidMembership(_))));
    }

    #[test]
    fn test_node_options_follow_config() {
        let config = NodeConfig {
            retry: RetryConfig {
                max_attempts: 9,
                initial_backoff_ms: 10,
                max_backoff_ms: 20,
            },
            stall_timeout_ms: 500,
            initial_clock: 7,
            simulated_latency_ms: Some(LatencyRange { min: 30, max: 10 }),
            ..NodeConfig::default()
        };

        let options = config.node_options();
        assert_eq!(options.retry.max_attempts, 9);
        assert_eq!(options.retry.max_backoff, Duration::from_millis(20));
        assert_eq!(options.stall_timeout, Duration::from_millis(500));
        assert_eq!(options.initial_clock, 7);
        assert_eq!(
            config.simulated_latency(),
            Some((Duration::from_millis(10), Duration::from_millis(10)))
        );
    }
}
