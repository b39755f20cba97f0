//! Human-readable socket address text: `ip/port`.
//!
//! IPv6 addresses are printed bare (no brackets) so both families share
//! the same `address/port` shape in logs and events.

use std::fmt;
use std::net::SocketAddr;

/// Display adapter for an optional socket address.
///
/// `None` renders as `NULL`.
#[derive(Debug, Clone, Copy)]
pub struct NetAddrText<'a>(pub Option<&'a SocketAddr>);

impl fmt::Display for NetAddrText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(SocketAddr::V4(v4)) => write!(f, "{}/{}", v4.ip(), v4.port()),
            Some(SocketAddr::V6(v6)) => write!(f, "{}/{}", v6.ip(), v6.port()),
            None => f.write_str("NULL"),
        }
    }
}

pub fn net_addr_text(addr: Option<&SocketAddr>) -> String {
    NetAddrText(addr).to_string()
}
