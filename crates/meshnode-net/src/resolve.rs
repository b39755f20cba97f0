//! Async host/service resolution and peer target parsing.
//!
//! A peer is given on the command line either as a bare port (the peer runs on
//! this host) or as `HOST:PORT`. Resolution runs on the tokio blocking pool via
//! `tokio::net::lookup_host`, so callers never stall the reactor.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::{NetError, MAX_HOST_LEN, MAX_SERVICE_LEN};

/// Host used when the caller does not name one.
pub const DEFAULT_HOST: &str = "localhost";

/// Resolve `host`/`service` to every matching socket address, in resolver order.
///
/// `host` defaults to [`DEFAULT_HOST`]. `service` must be a numeric port.
pub async fn resolve_all(host: Option<&str>, service: &str) -> Result<Vec<SocketAddr>, NetError> {
    let host = host.unwrap_or(DEFAULT_HOST);
    if service.is_empty() {
        return Err(NetError::MissingService);
    }
    check_len("host", host, MAX_HOST_LEN)?;
    check_len("service", service, MAX_SERVICE_LEN)?;
    let port: u16 = service
        .parse()
        .map_err(|_| NetError::InvalidService(service.to_string()))?;

    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(source) => {
            tracing::error!(host, service, "address lookup failed: {source}");
            return Err(NetError::Resolve {
                host: host.to_string(),
                service: service.to_string(),
                source,
            });
        }
    };

    if addrs.is_empty() {
        return Err(NetError::NoAddress {
            host: host.to_string(),
            service: service.to_string(),
        });
    }
    tracing::debug!(host, service, count = addrs.len(), "resolved address");
    Ok(addrs)
}

/// Resolve `host`/`service` to a single socket address (the resolver's first answer).
pub async fn resolve_address(host: Option<&str>, service: &str) -> Result<SocketAddr, NetError> {
    let mut addrs = resolve_all(host, service).await?;
    // resolve_all never returns an empty list
    Ok(addrs.swap_remove(0))
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), NetError> {
    if value.len() > max {
        return Err(NetError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Where a node should connect out to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerTarget {
    /// `None` means [`DEFAULT_HOST`].
    pub host: Option<String>,
    pub port: u16,
}

impl PeerTarget {
    pub fn local(port: u16) -> Self {
        Self { host: None, port }
    }

    /// First address for this target, as [`resolve_address`] returns it.
    pub async fn resolve(&self) -> Result<SocketAddr, NetError> {
        resolve_address(self.host.as_deref(), &self.port.to_string()).await
    }

    pub async fn resolve_all(&self) -> Result<Vec<SocketAddr>, NetError> {
        resolve_all(self.host.as_deref(), &self.port.to_string()).await
    }
}

impl FromStr for PeerTarget {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || NetError::InvalidPeer(s.to_string());

        let target = if let Ok(port) = s.parse::<u16>() {
            PeerTarget::local(port)
        } else if let Ok(sa) = s.parse::<SocketAddr>() {
            PeerTarget {
                host: Some(sa.ip().to_string()),
                port: sa.port(),
            }
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() || host.contains(':') {
                return Err(invalid());
            }
            PeerTarget {
                host: Some(host.to_string()),
                port: port.parse().map_err(|_| invalid())?,
            }
        };

        if target.port == 0 {
            return Err(invalid());
        }
        Ok(target)
    }
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_deref() {
            None => write!(f, "{}", self.port),
            Some(host) if host.parse::<IpAddr>().is_ok_and(|ip| ip.is_ipv6()) => {
                write!(f, "[{}]:{}", host, self.port)
            }
            Some(host) => write!(f, "{}:{}", host, self.port),
        }
    }
}
