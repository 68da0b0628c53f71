//! Client address handling: host:port splitting, parsing and exemptions.

use std::net::{IpAddr, Ipv6Addr};

use crate::error::{BlacklistError, BlacklistResult};

/// Split a transport-level `host:port` string into host and port.
///
/// IPv6 hosts must be bracketed (`[2001:db8::1]:443`). The port is not
/// validated beyond being present.
///
/// # Errors
///
/// Returns `BlacklistError::InvalidRemoteAddr` if there is no port, an
/// unbracketed host contains colons, or brackets are unbalanced.
pub fn split_host_port(remote: &str) -> BlacklistResult<(&str, &str)> {
    let invalid = || BlacklistError::InvalidRemoteAddr(remote.to_string());

    if let Some(rest) = remote.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        let port = after.strip_prefix(':').ok_or_else(invalid)?;
        if host.contains('[') || host.contains(']') || port.contains(']') {
            return Err(invalid());
        }
        return Ok((host, port));
    }

    let (host, port) = remote.rsplit_once(':').ok_or_else(invalid)?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return Err(invalid());
    }
    Ok((host, port))
}

/// Parse a client address, folding IPv4-mapped IPv6 onto IPv4.
///
/// # Errors
///
/// Returns `BlacklistError::InvalidAddress` if `host` is not an IP address.
pub fn parse_client_address(host: &str) -> BlacklistResult<IpAddr> {
    host.parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| BlacklistError::InvalidAddress(host.to_string()))
}

/// Split a `host:port` remote address and parse its host part.
///
/// # Errors
///
/// See [`split_host_port`] and [`parse_client_address`].
pub fn parse_remote_addr(remote: &str) -> BlacklistResult<IpAddr> {
    let (host, _port) = split_host_port(remote)?;
    parse_client_address(host)
}

/// Loopback and private-range addresses are never counted or blocked.
#[must_use]
pub fn is_exempt(ip: &IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback() || is_unique_local(&v6),
    }
}

/// fc00::/7
const fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}
