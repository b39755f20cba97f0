//! Meshnode -- one vertex of a test topology.
//!
//! Usage:
//!   meshnode E                              # ephemeral port, no peers
//!   meshnode -l 40001 -p 40004 B            # fixed port, one peer
//!   meshnode -p 40001 -p 40002 -p 40003 A   # fan out to three peers
//!   meshnode --config node.toml             # label/ports from file
//!
//! The bound port is reported on stdout as a `listening` JSON line.

use clap::Parser;

use meshnode::config::{self, Overrides};
use meshnode::events::EventSink;
use meshnode::expand_tilde;
use meshnode::logging::{self, LogFormat};

#[derive(Parser)]
#[command(name = "meshnode", about = "Topology test node")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on (0 or omitted = ephemeral)
    #[arg(short = 'l', long = "listen")]
    listen: Option<u16>,

    /// Peer to connect to, as PORT or HOST:PORT (repeatable)
    #[arg(short = 'p', long = "peer")]
    peers: Vec<String>,

    /// Interface to bind
    #[arg(long)]
    bind: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Node label, e.g. A..E
    label: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_format, "meshnode=info,meshnode_net=info");

    let mut cfg = match &cli.config {
        Some(path) => config::NodeConfig::load_or_default(&expand_tilde(path))?,
        None => config::NodeConfig::default(),
    };
    cfg.apply(Overrides {
        label: cli.label,
        listen_port: cli.listen,
        peers: cli.peers,
        bind_host: cli.bind,
    });

    let mut node = meshnode::start(cfg, EventSink::Stdout).await?;
    let result = node.wait().await;
    node.shutdown().await;
    result?;
    Ok(())
}
