//! Node lifecycle events, written one JSON object per line on stdout.
//!
//! This is the harness-to-node contract: the harness blocks on `listening` to
//! learn a node's bound port before starting anything that dials it.

use serde::{Deserialize, Serialize};

use crate::NetError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    /// Listener bound. Emitted exactly once, before any outbound dial.
    Listening {
        label: String,
        port: u16,
        addr: String,
    },
    /// Outbound link to a configured peer established.
    PeerConnected {
        label: String,
        peer: String,
        addr: String,
    },
    /// Inbound link accepted.
    PeerAccepted { label: String, addr: String },
    /// Link (either direction) closed.
    PeerClosed { label: String, addr: String },
    Shutdown { label: String },
}

impl NodeEvent {
    pub fn label(&self) -> &str {
        match self {
            NodeEvent::Listening { label, .. }
            | NodeEvent::PeerConnected { label, .. }
            | NodeEvent::PeerAccepted { label, .. }
            | NodeEvent::PeerClosed { label, .. }
            | NodeEvent::Shutdown { label } => label,
        }
    }

    /// Encode as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String, NetError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one stdout line. Blank lines yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, NetError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line)?))
    }
}
