//! Node runtime -- bind, announce, accept, dial.
//!
//! Startup order matters to the harness: the listener is bound and the
//! `listening` event written before `start` returns and before any dial
//! begins, so a dependent can be launched as soon as the port is read.

use std::net::SocketAddr;

use meshnode_net::{net_addr_text, NodeEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::dialer::{self, DialPolicy};
use crate::events::EventSink;
use crate::link::LinkContext;
use crate::listener;
use crate::peer_table::{LinkCounts, LinkHandle, PeerTable};
use crate::NodeError;

/// A started node. Dropping it without `shutdown` leaves its tasks running
/// until the runtime stops.
pub struct RunningNode {
    label: String,
    local_addr: SocketAddr,
    links: LinkContext,
    fatal_rx: mpsc::Receiver<NodeError>,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

/// Start a node: bind, emit `listening`, then spawn the accept loop and dials.
pub async fn start(cfg: NodeConfig, events: EventSink) -> Result<RunningNode, NodeError> {
    cfg.validate()?;
    let label = cfg.label()?.to_string();
    let targets = cfg.peer_targets()?;
    let policy = DialPolicy::from(&cfg.network);

    let listener = listener::bind(&cfg.network.bind_host, cfg.node.listen_port).await?;
    let local_addr = listener.local_addr()?;
    let addr_text = net_addr_text(Some(&local_addr));

    tracing::info!(
        label = %label,
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr_text,
        peers = targets.len(),
        "node listening"
    );
    events.emit(NodeEvent::Listening {
        label: label.clone(),
        port: local_addr.port(),
        addr: addr_text,
    });

    let (fatal_tx, fatal_rx) = mpsc::channel::<NodeError>(1);
    let links = LinkContext::new(label.clone(), PeerTable::new(), events);

    let mut handles = Vec::new();

    // Spawn accept loop
    {
        let ctx = links.clone();
        handles.push(tokio::spawn(async move {
            listener::run_accept_loop(listener, ctx).await;
        }));
    }

    // Spawn dials
    {
        let ctx = links.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = dialer::dial_all(targets, policy, ctx).await {
                tracing::error!("{e}");
                let _ = fatal_tx.send(e).await;
            }
        }));
    }

    Ok(RunningNode {
        label,
        local_addr,
        links,
        fatal_rx,
        handles,
        running: true,
    })
}

impl RunningNode {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Snapshot of the links that are up right now.
    pub async fn peers(&self) -> Vec<LinkHandle> {
        self.links.table.snapshot().await
    }

    pub async fn link_counts(&self) -> LinkCounts {
        self.links.table.counts().await
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resolve an address through this node. Fails once the node has stopped.
    pub async fn resolve(
        &self,
        host: Option<&str>,
        service: &str,
    ) -> Result<SocketAddr, NodeError> {
        if !self.running {
            return Err(NodeError::NotRunning);
        }
        Ok(meshnode_net::resolve_address(host, service).await?)
    }

    /// Block until ctrl-c, SIGTERM, or a fatal dial error.
    pub async fn wait(&mut self) -> Result<(), NodeError> {
        if !self.running {
            return Err(NodeError::NotRunning);
        }
        tokio::select! {
            fatal = self.fatal_rx.recv() => match fatal {
                Some(e) => Err(e),
                // dial task finished without error and dropped its sender
                None => {
                    wait_for_signal().await?;
                    Ok(())
                }
            },
            signal = wait_for_signal() => signal,
        }
    }

    /// Stop all tasks and drop every link. Safe to call more than once.
    ///
    /// The accept loop and dials are joined first, so no link can be
    /// registered while the link tasks are being waited for.
    pub async fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        tracing::info!(label = %self.label, "shutting down...");
        self.links.shutdown.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        self.links.close().await;
        self.links.events.emit(NodeEvent::Shutdown {
            label: self.label.clone(),
        });
        tracing::info!(label = %self.label, "shutdown complete");
    }
}

async fn wait_for_signal() -> Result<(), NodeError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
