//! Topology graph -- which node links out to which, and in what order to start them.
//!
//! An edge `X -> Y` means X dials Y, so Y must be listening (and its port
//! known) before X starts. Start order is therefore a topological sort with
//! sinks first.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub label: String,
    /// `None` = ephemeral port, discovered at start.
    #[serde(default)]
    pub listen_port: Option<u16>,
    /// Labels this node dials.
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(rename = "node", default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    Empty,
    #[error("duplicate node label {0:?}")]
    DuplicateLabel(String),
    #[error("node {node:?} lists unknown peer {peer:?}")]
    UnknownPeer { node: String, peer: String },
    #[error("node {node:?} lists peer {peer:?} more than once")]
    DuplicatePeer { node: String, peer: String },
    #[error("node {0:?} lists itself as a peer")]
    SelfEdge(String),
    #[error("dependency cycle among {0:?}")]
    Cycle(Vec<String>),
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style node declaration.
    pub fn node(mut self, label: &str, listen_port: Option<u16>, peers: &[&str]) -> Self {
        self.nodes.push(NodeSpec {
            label: label.into(),
            listen_port,
            peers: peers.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Five-node fan-out/fan-in fixture, all ports ephemeral.
    ///
    /// ```text
    ///           /---> B ----\
    ///         A ----> C ----> E
    ///           \---> D ----/
    /// ```
    pub fn tree() -> Self {
        Self::new()
            .node("A", None, &["B", "C", "D"])
            .node("B", None, &["E"])
            .node("C", None, &["E"])
            .node("D", None, &["E"])
            .node("E", None, &[])
    }

    /// Read a topology from a TOML file of `[[node]]` tables.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        let topology: Topology = toml::from_str(&content)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn get(&self, label: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.label == label)
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        self.start_order().map(|_| ())
    }

    /// Nodes in start order: every node after all of its peers.
    ///
    /// Among nodes that are ready at the same time, declaration order wins,
    /// so the result is deterministic.
    pub fn start_order(&self) -> Result<Vec<&NodeSpec>, TopologyError> {
        if self.nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.label.as_str(), i).is_some() {
                return Err(TopologyError::DuplicateLabel(node.label.clone()));
            }
        }

        // pending[i] = peers of i not yet started; dependents[j] = nodes that dial j
        let mut pending = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for peer in &node.peers {
                if *peer == node.label {
                    return Err(TopologyError::SelfEdge(node.label.clone()));
                }
                let j = *index.get(peer.as_str()).ok_or_else(|| TopologyError::UnknownPeer {
                    node: node.label.clone(),
                    peer: peer.clone(),
                })?;
                if !seen.insert(j) {
                    return Err(TopologyError::DuplicatePeer {
                        node: node.label.clone(),
                        peer: peer.clone(),
                    });
                }
                pending[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: BTreeSet<usize> =
            (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(&self.nodes[i]);
            for &d in &dependents[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| pending[*i] > 0)
                .map(|(_, n)| n.label.clone())
                .collect();
            return Err(TopologyError::Cycle(stuck));
        }
        Ok(order)
    }
}
