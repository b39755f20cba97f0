//! One spawned node process, its discovered port, and its event stream.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use meshnode_net::NodeEvent;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::harness::LaunchOptions;
use crate::topology::NodeSpec;
use crate::HarnessError;

/// Command-line arguments for a node: `[-l PORT] [-p PEER]... LABEL`.
pub fn node_args(spec: &NodeSpec, peer_ports: &[u16]) -> Vec<String> {
    let mut args = Vec::with_capacity(3 + peer_ports.len() * 2);
    if let Some(port) = spec.listen_port {
        args.push("-l".to_string());
        args.push(port.to_string());
    }
    for port in peer_ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    args.push(spec.label.clone());
    args
}

/// A running node child process.
pub struct NodeProcess {
    label: String,
    port: u16,
    peer_ports: Vec<u16>,
    args: Vec<String>,
    child: Child,
    events: Arc<RwLock<Vec<NodeEvent>>>,
    reader: JoinHandle<()>,
    terminated: bool,
}

impl NodeProcess {
    /// Spawn a node and block until it reports its listening port.
    pub async fn spawn(
        binary: &Path,
        spec: &NodeSpec,
        peer_ports: &[u16],
        opts: &LaunchOptions,
    ) -> Result<Self, HarnessError> {
        let label = spec.label.clone();
        let args = node_args(spec, peer_ports);

        let mut cmd = Command::new(binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if opts.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(filter) = &opts.log_filter {
            cmd.env("RUST_LOG", filter);
        }
        tracing::debug!(label = %label, ?args, "spawning node");

        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            label: label.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| HarnessError::Spawn {
            label: label.clone(),
            source: std::io::Error::other("stdout not captured"),
        })?;

        let mut lines = BufReader::new(stdout).lines();
        let events = Arc::new(RwLock::new(Vec::new()));

        // One deadline covers both reading the port and reaping a child that
        // closed stdout without reporting one.
        let deadline = tokio::time::Instant::now() + opts.port_timeout;
        let port_timeout = |label| HarnessError::PortTimeout {
            label,
            timeout: opts.port_timeout,
        };

        let port = match tokio::time::timeout_at(deadline, read_port(&mut lines, &events)).await {
            Ok(Ok(Some(port))) => port,
            Ok(Ok(None)) => match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => {
                    return Err(HarnessError::EarlyExit {
                        label,
                        status: status.to_string(),
                    })
                }
                Ok(Err(e)) => {
                    return Err(HarnessError::EarlyExit {
                        label,
                        status: format!("wait failed: {e}"),
                    })
                }
                Err(_) => {
                    tracing::warn!(label = %label, "node closed stdout without reporting a port");
                    let _ = child.kill().await;
                    return Err(port_timeout(label));
                }
            },
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(HarnessError::Io(e));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(port_timeout(label));
            }
        };

        let reader = {
            let events = events.clone();
            let label = label.clone();
            tokio::spawn(async move {
                collect_events(lines, events, &label).await;
            })
        };

        tracing::info!(label = %label, port, pid = child.id(), ?peer_ports, "node started");
        Ok(Self {
            label,
            port,
            peer_ports: peer_ports.to_vec(),
            args,
            child,
            events,
            reader,
            terminated: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Port the node reported in its `listening` event.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Peer ports this node was launched with, in `-p` order.
    pub fn peer_ports(&self) -> &[u16] {
        &self.peer_ports
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_alive(&mut self) -> bool {
        !self.terminated && matches!(self.child.try_wait(), Ok(None))
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Every event read from the node so far, in order.
    pub async fn events(&self) -> Vec<NodeEvent> {
        self.events.read().await.clone()
    }

    pub async fn connected_count(&self) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| matches!(e, NodeEvent::PeerConnected { .. }))
            .count()
    }

    pub async fn accepted_count(&self) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| matches!(e, NodeEvent::PeerAccepted { .. }))
            .count()
    }

    /// Poll until the node has reported at least `n` outbound links, or timeout.
    pub async fn wait_connected(&self, n: usize, timeout: Duration) -> Result<(), HarnessError> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.connected_count().await < n {
            if tokio::time::Instant::now() > deadline {
                return Err(HarnessError::WaitTimeout {
                    label: self.label.clone(),
                    what: format!("{n} outbound links"),
                });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    /// Poll until the node has reported at least `n` inbound links, or timeout.
    pub async fn wait_accepted(&self, n: usize, timeout: Duration) -> Result<(), HarnessError> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.accepted_count().await < n {
            if tokio::time::Instant::now() > deadline {
                return Err(HarnessError::WaitTimeout {
                    label: self.label.clone(),
                    what: format!("{n} inbound links"),
                });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    /// Kill the child and reap it. A second call is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> Result<(), HarnessError> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        // start_kill fails with InvalidInput once the child has already been reaped
        if let Err(e) = self.child.start_kill() {
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!(label = %self.label, "kill failed: {e}");
            }
        }
        let result = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(label = %self.label, %status, "node terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(HarnessError::Teardown {
                label: self.label.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HarnessError::Teardown {
                label: self.label.clone(),
                reason: format!("still running after {grace:?}"),
            }),
        };
        self.reader.abort();
        result
    }

    /// Synchronous best-effort kill for use from `Drop`.
    pub(crate) fn kill_now(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let _ = self.child.start_kill();
        self.reader.abort();
    }
}

/// Read stdout until the `listening` event. `Ok(None)` = stdout closed first.
async fn read_port(
    lines: &mut Lines<BufReader<ChildStdout>>,
    events: &RwLock<Vec<NodeEvent>>,
) -> std::io::Result<Option<u16>> {
    while let Some(line) = lines.next_line().await? {
        match NodeEvent::parse_line(&line) {
            Ok(Some(event)) => {
                let port = match &event {
                    NodeEvent::Listening { port, .. } => Some(*port),
                    _ => None,
                };
                events.write().await.push(event);
                if port.is_some() {
                    return Ok(port);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(line = %line, "ignoring non-event output: {e}"),
        }
    }
    Ok(None)
}

async fn collect_events(
    mut lines: Lines<BufReader<ChildStdout>>,
    events: Arc<RwLock<Vec<NodeEvent>>>,
    label: &str,
) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match NodeEvent::parse_line(&line) {
                Ok(Some(event)) => {
                    tracing::debug!(label, ?event, "node event");
                    events.write().await.push(event);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(label, line = %line, "ignoring non-event output: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(label, "event stream error: {e}");
                break;
            }
        }
    }
}
