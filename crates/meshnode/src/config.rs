//! Configuration types for meshnode.
//! Parsed from an optional TOML file, then overridden by command-line flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use meshnode_net::PeerTarget;

use crate::NodeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSection {
    pub label: Option<String>,
    /// 0 = ephemeral.
    #[serde(default)]
    pub listen_port: u16,
    /// Peer targets, each `PORT` or `HOST:PORT`.
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_dial_attempts")]
    pub dial_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub dial_backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub dial_backoff_max_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            dial_attempts: default_dial_attempts(),
            dial_backoff_base_ms: default_backoff_base_ms(),
            dial_backoff_max_ms: default_backoff_max_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// Default value functions
fn default_bind_host() -> String {
    "127.0.0.1".into()
}
fn default_dial_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    100
}
fn default_backoff_max_ms() -> u64 {
    2000
}
fn default_connect_timeout_ms() -> u64 {
    3000
}

/// Values given on the command line. Anything set here wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub label: Option<String>,
    pub listen_port: Option<u16>,
    pub peers: Vec<String>,
    pub bind_host: Option<String>,
}

impl NodeConfig {
    /// Load config from file, or fall back to defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self, NodeError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: NodeConfig = toml::from_str(&content)
                .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply command-line overrides. A non-empty peer list replaces the file's list.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(label) = overrides.label {
            self.node.label = Some(label);
        }
        if let Some(port) = overrides.listen_port {
            self.node.listen_port = port;
        }
        if !overrides.peers.is_empty() {
            self.node.peers = overrides.peers;
        }
        if let Some(host) = overrides.bind_host {
            self.network.bind_host = host;
        }
    }

    pub fn label(&self) -> Result<&str, NodeError> {
        match self.node.label.as_deref() {
            Some(label) if !label.trim().is_empty() => Ok(label),
            _ => Err(NodeError::Config("node label is required".into())),
        }
    }

    pub fn peer_targets(&self) -> Result<Vec<PeerTarget>, NodeError> {
        self.node
            .peers
            .iter()
            .map(|p| p.parse::<PeerTarget>().map_err(NodeError::from))
            .collect()
    }

    /// Check everything `start` needs before any socket is opened.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.label()?;
        self.peer_targets()?;
        if self.network.dial_attempts == 0 {
            return Err(NodeError::Config("dial_attempts must be at least 1".into()));
        }
        if self.network.dial_backoff_base_ms > self.network.dial_backoff_max_ms {
            return Err(NodeError::Config(
                "dial_backoff_base_ms must not exceed dial_backoff_max_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }
}
