//! Test helpers for meshnode integration tests.
//!
//! Provides TestNodeBuilder for in-process nodes (same tokio runtime) and
//! helpers for launching the real `meshnode` binary through meshnode-harness.

use std::path::PathBuf;
use std::time::Duration;

use meshnode::config::{NodeConfig, NodeSection};
use meshnode::events::EventSink;
use meshnode::peer_table::LinkCounts;
use meshnode::RunningNode;
use meshnode_harness::LaunchOptions;
use meshnode_net::NodeEvent;
use tokio::sync::broadcast;

/// Path of the node binary built for this test run.
pub fn node_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_meshnode"))
}

pub fn launch_options() -> LaunchOptions {
    LaunchOptions {
        port_timeout: Duration::from_secs(20),
        teardown_grace: Duration::from_secs(10),
        log_filter: Some("meshnode=debug".into()),
        inherit_stderr: false,
    }
}

/// Builder for configuring and starting an in-process node.
pub struct TestNodeBuilder {
    cfg: NodeConfig,
}

#[allow(dead_code)]
impl TestNodeBuilder {
    pub fn new(label: &str) -> Self {
        let mut cfg = NodeConfig {
            node: NodeSection {
                label: Some(label.into()),
                listen_port: 0,
                peers: vec![],
            },
            ..Default::default()
        };
        cfg.network.dial_attempts = 3;
        cfg.network.dial_backoff_base_ms = 20;
        cfg.network.dial_backoff_max_ms = 100;
        cfg.network.connect_timeout_ms = 1000;
        Self { cfg }
    }

    pub fn peer(mut self, port: u16) -> Self {
        self.cfg.node.peers.push(port.to_string());
        self
    }

    pub fn peers(mut self, ports: &[u16]) -> Self {
        self.cfg.node.peers = ports.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn dial_attempts(mut self, attempts: u32) -> Self {
        self.cfg.network.dial_attempts = attempts;
        self
    }

    pub async fn build(self) -> anyhow::Result<TestNode> {
        let (sink, events) = EventSink::channel(256);
        let node = meshnode::start(self.cfg, sink).await?;
        Ok(TestNode { node, events })
    }
}

/// A running in-process node plus its event receiver.
pub struct TestNode {
    pub node: RunningNode,
    pub events: broadcast::Receiver<NodeEvent>,
}

#[allow(dead_code)]
impl TestNode {
    pub fn port(&self) -> u16 {
        self.node.port()
    }

    pub async fn counts(&self) -> LinkCounts {
        self.node.link_counts().await
    }

    /// Poll the peer table until at least `inbound`/`outbound` links are up, or timeout.
    pub async fn wait_links(
        &self,
        inbound: usize,
        outbound: usize,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let counts = self.counts().await;
            if counts.inbound >= inbound && counts.outbound >= outbound {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!(
                    "timeout waiting for {} inbound / {} outbound links on {} (have {:?})",
                    inbound,
                    outbound,
                    self.node.label(),
                    counts,
                );
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn shutdown(mut self) {
        self.node.shutdown().await;
    }
}

/// Start the five-node tree in-process, sink first, the same way the process harness does.
pub struct TestTree {
    pub a: TestNode,
    pub b: TestNode,
    pub c: TestNode,
    pub d: TestNode,
    pub e: TestNode,
}

#[allow(dead_code)]
impl TestTree {
    pub async fn new() -> anyhow::Result<Self> {
        let e = TestNodeBuilder::new("E").build().await?;
        let b = TestNodeBuilder::new("B").peer(e.port()).build().await?;
        let c = TestNodeBuilder::new("C").peer(e.port()).build().await?;
        let d = TestNodeBuilder::new("D").peer(e.port()).build().await?;
        let a = TestNodeBuilder::new("A")
            .peers(&[b.port(), c.port(), d.port()])
            .build()
            .await?;
        Ok(Self { a, b, c, d, e })
    }

    pub async fn wait_wired(&self, timeout: Duration) -> anyhow::Result<()> {
        self.a.wait_links(0, 3, timeout).await?;
        for mid in [&self.b, &self.c, &self.d] {
            mid.wait_links(1, 1, timeout).await?;
        }
        self.e.wait_links(3, 0, timeout).await?;
        Ok(())
    }

    pub async fn shutdown_all(self) {
        for node in [self.a, self.b, self.c, self.d, self.e] {
            node.shutdown().await;
        }
    }
}
