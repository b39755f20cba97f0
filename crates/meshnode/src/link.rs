//! Link lifetime -- hold a connected socket until the remote closes it or
//! the node shuts down, then deregister it.

use meshnode_net::{net_addr_text, NodeEvent, PeerTarget};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::events::EventSink;
use crate::peer_table::{Direction, PeerTable};

/// State shared by every task that owns links.
#[derive(Clone)]
pub struct LinkContext {
    pub label: String,
    pub table: PeerTable,
    pub events: EventSink,
    /// Cancelled once when the node shuts down. Late waiters see it too.
    pub shutdown: CancellationToken,
    /// Every link task, so shutdown can wait for them.
    pub tasks: TaskTracker,
}

impl LinkContext {
    pub fn new(label: impl Into<String>, table: PeerTable, events: EventSink) -> Self {
        Self {
            label: label.into(),
            table,
            events,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Cancel every task and wait until all link tasks have deregistered.
    /// Links registered after this returns are not waited for.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Register `stream` and spawn a task that owns it.
pub async fn register(
    ctx: &LinkContext,
    stream: TcpStream,
    direction: Direction,
    target: Option<PeerTarget>,
) -> std::io::Result<()> {
    let remote = stream.peer_addr()?;
    let addr = net_addr_text(Some(&remote));
    let id = ctx.table.insert(direction, remote, target.clone()).await;

    match (direction, target) {
        (Direction::Outbound, Some(target)) => {
            tracing::info!(label = %ctx.label, peer = %target, addr = %addr, "connected to peer");
            ctx.events.emit(NodeEvent::PeerConnected {
                label: ctx.label.clone(),
                peer: target.to_string(),
                addr,
            });
        }
        _ => {
            tracing::info!(label = %ctx.label, addr = %addr, "accepted inbound link");
            ctx.events.emit(NodeEvent::PeerAccepted {
                label: ctx.label.clone(),
                addr,
            });
        }
    }

    let task_ctx = ctx.clone();
    ctx.tasks.spawn(async move {
        hold(stream, &task_ctx, id).await;
    });
    Ok(())
}

async fn hold(mut stream: TcpStream, ctx: &LinkContext, id: u64) {
    // No payload is defined; anything the remote sends is drained and dropped.
    let mut buf = [0u8; 1024];
    let closed_by_remote = loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => break true,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(label = %ctx.label, id, "link read error: {e}");
                    break true;
                }
            },
            _ = ctx.shutdown.cancelled() => break false,
        }
    };

    if let Some(link) = ctx.table.remove(id).await {
        if closed_by_remote {
            let addr = net_addr_text(Some(&link.remote));
            tracing::info!(
                label = %ctx.label,
                direction = link.direction.as_str(),
                addr = %addr,
                "link closed by remote"
            );
            ctx.events.emit(NodeEvent::PeerClosed {
                label: ctx.label.clone(),
                addr,
            });
        }
    }
}
