//! Listener -- bind the node's port and accept inbound links until shutdown.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::link::{self, LinkContext};
use crate::peer_table::Direction;
use crate::NodeError;

/// Bind `host:port`. Port 0 asks the OS for an ephemeral port.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, NodeError> {
    let addr: SocketAddr = meshnode_net::resolve_address(Some(host), &port.to_string()).await?;
    TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::bind(addr, source))
}

/// Run the accept loop -- registers each inbound link in the peer table.
pub async fn run_accept_loop(listener: TcpListener, ctx: LinkContext) {
    loop {
        tokio::select! {
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _remote)) => {
                        let registered =
                            link::register(&ctx, stream, Direction::Inbound, None).await;
                        if let Err(e) = registered {
                            tracing::warn!(label = %ctx.label, "dropping inbound link: {e}");
                        }
                    }
                    Err(e) => {
                        tracing::error!(label = %ctx.label, "accept error: {e}");
                    }
                }
            }
            _ = ctx.shutdown.cancelled() => {
                tracing::info!(label = %ctx.label, "shutdown signal, stopping accept loop");
                break;
            }
        }
    }
}
