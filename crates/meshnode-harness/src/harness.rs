//! Topology harness -- sequential, sink-first startup with port injection,
//! and a cleanup list that runs exactly once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::NodeProcess;
use crate::topology::Topology;
use crate::HarnessError;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// How long to wait for a node's `listening` event.
    pub port_timeout: Duration,
    /// How long to wait for a killed node to be reaped.
    pub teardown_grace: Duration,
    /// `RUST_LOG` passed to every node.
    pub log_filter: Option<String>,
    /// Forward node stderr (logs) to ours.
    pub inherit_stderr: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            port_timeout: Duration::from_secs(10),
            teardown_grace: Duration::from_secs(5),
            log_filter: None,
            inherit_stderr: false,
        }
    }
}

/// A started topology. Nodes are held in start order.
pub struct Harness {
    binary: PathBuf,
    nodes: Vec<NodeProcess>,
    index: HashMap<String, usize>,
    teardown_grace: Duration,
    cleaned_up: bool,
}

impl Harness {
    /// Validate `topology` and start every node, sinks first.
    ///
    /// Each node's port is known before any node that dials it is launched.
    /// If a launch fails, the nodes already running are terminated before
    /// the error is returned.
    pub async fn start(
        binary: impl AsRef<Path>,
        topology: &Topology,
        opts: LaunchOptions,
    ) -> Result<Self, HarnessError> {
        let order = topology.start_order()?;
        let mut harness = Harness {
            binary: binary.as_ref().to_path_buf(),
            nodes: Vec::with_capacity(order.len()),
            index: HashMap::new(),
            teardown_grace: opts.teardown_grace,
            cleaned_up: false,
        };
        tracing::info!(
            nodes = order.len(),
            order = ?order.iter().map(|n| n.label.as_str()).collect::<Vec<_>>(),
            "starting topology"
        );

        for spec in order {
            // Start order guarantees every peer is already running.
            let peer_ports = spec
                .peers
                .iter()
                .map(|peer| harness.port(peer))
                .collect::<Result<Vec<u16>, _>>()?;

            match NodeProcess::spawn(&harness.binary, spec, &peer_ports, &opts).await {
                Ok(node) => {
                    harness.index.insert(spec.label.clone(), harness.nodes.len());
                    harness.nodes.push(node);
                }
                Err(e) => {
                    tracing::error!(label = %spec.label, "node failed to start: {e}");
                    if let Err(teardown) = harness.shutdown().await {
                        tracing::warn!("cleanup after failed start: {teardown}");
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(nodes = harness.nodes.len(), "topology running");
        Ok(harness)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn port(&self, label: &str) -> Result<u16, HarnessError> {
        self.node(label)
            .map(NodeProcess::port)
            .ok_or_else(|| HarnessError::UnknownNode(label.to_string()))
    }

    pub fn node(&self, label: &str) -> Option<&NodeProcess> {
        self.index.get(label).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, label: &str) -> Option<&mut NodeProcess> {
        match self.index.get(label) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    /// Nodes in the order they were started.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeProcess> {
        self.nodes.iter()
    }

    pub fn start_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.label()).collect()
    }

    /// Label → port for every started node.
    pub fn ports(&self) -> Vec<(String, u16)> {
        self.nodes
            .iter()
            .map(|n| (n.label().to_string(), n.port()))
            .collect()
    }

    pub fn all_alive(&mut self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter_mut().all(|n| n.is_alive())
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    /// Terminate every node, most recently started first. Runs once; later
    /// calls return `Ok(())`. Every node is attempted even if one fails, and
    /// the first failure is returned.
    pub async fn shutdown(&mut self) -> Result<(), HarnessError> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        let mut first_err = None;
        for node in self.nodes.iter_mut().rev() {
            if let Err(e) = node.terminate(self.teardown_grace).await {
                tracing::warn!(label = node.label(), "teardown failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        tracing::info!(nodes = self.nodes.len(), "topology torn down");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        tracing::debug!(
            nodes = self.nodes.len(),
            "harness dropped without shutdown, killing nodes"
        );
        for node in self.nodes.iter_mut().rev() {
            node.kill_now();
        }
    }
}
