//! Peer table -- thread-safe registry of live links.
//!
//! Maps link id → LinkHandle (metadata only, no socket). The link tasks own
//! the sockets; this table tracks what is connected and in which direction.

use meshnode_net::PeerTarget;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Handle to a live link (metadata only).
#[derive(Debug, Clone)]
pub struct LinkHandle {
    pub id: u64,
    pub direction: Direction,
    pub remote: SocketAddr,
    /// Configured target for outbound links.
    pub target: Option<PeerTarget>,
    pub connected_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub inbound: usize,
    pub outbound: usize,
}

/// Thread-safe table of live links.
#[derive(Clone, Default)]
pub struct PeerTable {
    inner: Arc<RwLock<HashMap<u64, LinkHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link and return its id.
    pub async fn insert(
        &self,
        direction: Direction,
        remote: SocketAddr,
        target: Option<PeerTarget>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = LinkHandle {
            id,
            direction,
            remote,
            target,
            connected_at: Instant::now(),
        };
        let table_size = {
            let mut table = self.inner.write().await;
            table.insert(id, handle);
            table.len()
        };
        tracing::debug!(
            id,
            direction = direction.as_str(),
            %remote,
            table_size,
            "link registered"
        );
        id
    }

    pub async fn remove(&self, id: u64) -> Option<LinkHandle> {
        let removed = self.inner.write().await.remove(&id);
        if let Some(ref link) = removed {
            tracing::debug!(
                id,
                direction = link.direction.as_str(),
                remote = %link.remote,
                up_ms = link.connected_at.elapsed().as_millis() as u64,
                "link removed"
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn counts(&self) -> LinkCounts {
        let table = self.inner.read().await;
        let mut counts = LinkCounts::default();
        for link in table.values() {
            match link.direction {
                Direction::Inbound => counts.inbound += 1,
                Direction::Outbound => counts.outbound += 1,
            }
        }
        counts
    }

    /// All links, oldest first.
    pub async fn snapshot(&self) -> Vec<LinkHandle> {
        let mut links: Vec<LinkHandle> = self.inner.read().await.values().cloned().collect();
        links.sort_by_key(|l| l.id);
        links
    }
}
