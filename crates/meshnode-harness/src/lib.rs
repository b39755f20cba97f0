//! Meshnode harness -- launch a topology of node processes and clean up after it.
//!
//! Nodes are started one at a time, sinks first. Each launch blocks until the
//! node reports its bound port; that port is then passed to every node that
//! dials it. All children are terminated exactly once, through
//! `Harness::shutdown` or on drop.

pub mod harness;
pub mod process;
pub mod topology;

pub use harness::{Harness, LaunchOptions};
pub use process::NodeProcess;
pub use topology::{NodeSpec, Topology, TopologyError};

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("failed to spawn node {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("node {label} did not report a port within {timeout:?}")]
    PortTimeout { label: String, timeout: Duration },
    #[error("node {label} exited before reporting a port ({status})")]
    EarlyExit { label: String, status: String },
    #[error("node {label} did not terminate: {reason}")]
    Teardown { label: String, reason: String },
    #[error("unknown node {0:?}")]
    UnknownNode(String),
    #[error("timeout waiting for {what} on node {label}")]
    WaitTimeout { label: String, what: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
