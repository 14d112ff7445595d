//! Network utility functions
//!
//! Address helpers shared by the configuration layer and the session host.

use std::net::{SocketAddr, ToSocketAddrs};

use super::error::{ProxyError, Result};

/// Parse a socket address, resolving host names when the literal form fails
///
/// # Arguments
///
/// * `addr` - The address string to parse (`ip:port` or `host:port`)
///
/// # Returns
///
/// The first resolved `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        return Ok(socket_addr);
    }

    let mut resolved = addr
        .to_socket_addrs()
        .map_err(|e| ProxyError::Config(format!("Failed to parse address {}: {}", addr, e)))?;

    resolved
        .next()
        .ok_or_else(|| ProxyError::Config(format!("Address resolved to nothing: {}", addr)))
}

/// Check that `addr` has the `host:port` shape without resolving it
pub fn has_host_and_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
