//! meshnode-harness -- start a topology of meshnode processes, hold it up
//! until ctrl-c or SIGTERM, then tear it down.
//!
//! Usage:
//!   meshnode-harness                                # built-in A -> {B,C,D} -> E tree
//!   meshnode-harness --topology topo.toml           # custom [[node]] graph
//!   meshnode-harness --node-bin target/debug/meshnode

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meshnode_harness::{Harness, LaunchOptions, Topology};

#[derive(Parser)]
#[command(name = "meshnode-harness", about = "Launch a meshnode test topology")]
struct Cli {
    /// Topology file ([[node]] tables). Defaults to the five-node tree.
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Path to the meshnode binary. Defaults to the one next to this executable.
    #[arg(long)]
    node_bin: Option<PathBuf>,

    /// Seconds to wait for each node to report its port
    #[arg(long, default_value_t = 10)]
    port_timeout_secs: u64,

    /// Forward node logs to stderr
    #[arg(long)]
    node_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshnode_harness=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let topology = match &cli.topology {
        Some(path) => Topology::load(path)?,
        None => Topology::tree(),
    };
    let node_bin = match cli.node_bin {
        Some(path) => path,
        None => default_node_bin()?,
    };

    let opts = LaunchOptions {
        port_timeout: Duration::from_secs(cli.port_timeout_secs),
        inherit_stderr: cli.node_logs,
        ..Default::default()
    };

    // Registered before any node starts, so a signal during startup is not lost.
    let signal = shutdown_signal()?;
    tokio::pin!(signal);

    let mut harness = tokio::select! {
        started = Harness::start(&node_bin, &topology, opts) => started?,
        _ = &mut signal => {
            // Dropping the half-started harness kills what it launched.
            tracing::info!("interrupted during startup");
            return Ok(());
        }
    };
    for (label, port) in harness.ports() {
        println!("{label}\t{port}");
    }

    tracing::info!("topology up, press Ctrl-C to stop");
    signal.await;
    tracing::info!("shutting down...");
    harness.shutdown().await?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = int.recv() => tracing::info!("received SIGINT"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {e}");
        }
    })
}

fn default_node_bin() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("cannot locate directory of {}", exe.display()))?;
    Ok(dir.join(format!("meshnode{}", std::env::consts::EXE_SUFFIX)))
}
