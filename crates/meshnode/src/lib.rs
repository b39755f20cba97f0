//! Meshnode -- library crate for the topology test node.
//!
//! A node binds one TCP listen port, announces it on stdout, then links out
//! to every configured peer. Re-exports all internal modules so integration
//! tests can run nodes in-process.

pub mod config;
pub mod dialer;
pub mod events;
pub mod link;
pub mod listener;
pub mod logging;
pub mod node;
pub mod peer_table;

pub use node::{start, RunningNode};

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("peer {peer} unreachable after {attempts} attempts: {reason}")]
    Dial {
        peer: String,
        attempts: u32,
        reason: String,
    },
    #[error("node is not running")]
    NotRunning,
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Net(#[from] meshnode_net::NetError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        NodeError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
