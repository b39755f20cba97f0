//! Meshnode networking primitives -- address text, async resolution, node events.
//!
//! Nodes talk plain TCP with no payload framing. The only structured data is
//! the JSON-lines event stream a node writes to stdout for its harness.

pub mod addr;
pub mod event;
pub mod resolve;

pub use addr::{net_addr_text, NetAddrText};
pub use event::NodeEvent;
pub use resolve::{resolve_address, resolve_all, PeerTarget, DEFAULT_HOST};

/// Maximum host name length in bytes (RFC 1034/1035).
pub const MAX_HOST_LEN: usize = 255;

/// Maximum service name length in bytes (RFC 6335 section 5.1).
pub const MAX_SERVICE_LEN: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("service must not be empty")]
    MissingService,
    #[error("invalid service {0:?}: expected a numeric port")]
    InvalidService(String),
    #[error("{field} too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("failed to resolve {host}:{service}: {source}")]
    Resolve {
        host: String,
        service: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no address found for {host}:{service}")]
    NoAddress { host: String, service: String },
    #[error("invalid peer {0:?}: expected PORT or HOST:PORT")]
    InvalidPeer(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
