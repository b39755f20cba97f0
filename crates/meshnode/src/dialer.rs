//! Dialer -- link out to every configured peer.
//!
//! Each peer is dialed concurrently. A dial is retried with exponential
//! backoff, min(2^n * base, max) plus up to 10% jitter. A peer still
//! unreachable after the last attempt is fatal for the node.

use std::time::Duration;

use meshnode_net::{net_addr_text, PeerTarget};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::config::NetworkSection;
use crate::link::{self, LinkContext};
use crate::peer_table::Direction;
use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub connect_timeout: Duration,
}

impl DialPolicy {
    /// Delay before retry number `retry` (1-based). Retry 0 has no delay.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

impl From<&NetworkSection> for DialPolicy {
    fn from(net: &NetworkSection) -> Self {
        Self {
            attempts: net.dial_attempts.max(1),
            backoff_base: Duration::from_millis(net.dial_backoff_base_ms),
            backoff_max: Duration::from_millis(net.dial_backoff_max_ms),
            connect_timeout: Duration::from_millis(net.connect_timeout_ms),
        }
    }
}

/// One connection attempt: resolve, then try each address in resolver order.
async fn try_connect(target: &PeerTarget, connect_timeout: Duration) -> Result<TcpStream, String> {
    let addrs = target.resolve_all().await.map_err(|e| e.to_string())?;
    let mut last_err = String::from("no addresses");
    for addr in addrs {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = format!("{}: {e}", net_addr_text(Some(&addr))),
            Err(_) => {
                last_err = format!(
                    "{}: timed out after {}ms",
                    net_addr_text(Some(&addr)),
                    connect_timeout.as_millis()
                )
            }
        }
    }
    Err(last_err)
}

/// Dial one peer, retrying per `policy`.
pub async fn dial_peer(target: &PeerTarget, policy: DialPolicy) -> Result<TcpStream, NodeError> {
    let mut reason = String::new();
    for attempt in 0..policy.attempts {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 10);
            tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
        }
        match try_connect(target, policy.connect_timeout).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::warn!(
                    peer = %target,
                    attempt = attempt + 1,
                    of = policy.attempts,
                    "dial failed: {e}"
                );
                reason = e;
            }
        }
    }
    Err(NodeError::Dial {
        peer: target.to_string(),
        attempts: policy.attempts,
        reason,
    })
}

/// Dial every target and register the resulting links.
///
/// Returns the first fatal dial error. Dials still pending at shutdown are
/// dropped, and every dial task has finished by the time this returns.
pub async fn dial_all(
    targets: Vec<PeerTarget>,
    policy: DialPolicy,
    ctx: LinkContext,
) -> Result<(), NodeError> {
    if targets.is_empty() {
        tracing::info!(label = %ctx.label, "no peers configured -- accepting inbound links only");
        return Ok(());
    }

    let mut dials = JoinSet::new();
    for target in targets {
        let ctx = ctx.clone();
        dials.spawn(async move {
            let stream = tokio::select! {
                dialed = dial_peer(&target, policy) => dialed?,
                _ = ctx.shutdown.cancelled() => return Ok(()),
            };
            link::register(&ctx, stream, Direction::Outbound, Some(target)).await?;
            Ok::<(), NodeError>(())
        });
    }

    while let Some(joined) = dials.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                dials.shutdown().await;
                return Err(e);
            }
            Err(e) => tracing::error!(label = %ctx.label, "dial task panicked: {e}"),
        }
    }
    Ok(())
}
