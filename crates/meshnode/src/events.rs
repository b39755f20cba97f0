//! Event sink -- where a node reports lifecycle events.
//!
//! The binary writes JSON lines to stdout for the harness. In-process nodes
//! (tests) publish to a broadcast channel instead.

use std::io::Write;

use meshnode_net::NodeEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub enum EventSink {
    Stdout,
    Channel(broadcast::Sender<NodeEvent>),
    Discard,
}

impl EventSink {
    /// Create a channel sink and its first receiver.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<NodeEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (EventSink::Channel(tx), rx)
    }

    pub fn emit(&self, event: NodeEvent) {
        match self {
            EventSink::Stdout => {
                let line = match event.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("failed to encode event: {e}");
                        return;
                    }
                };
                let mut out = std::io::stdout().lock();
                // The harness may already have closed our stdout during teardown.
                if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
                    tracing::debug!("event write failed: {e}");
                }
            }
            EventSink::Channel(tx) => {
                let _ = tx.send(event);
            }
            EventSink::Discard => {}
        }
    }
}
