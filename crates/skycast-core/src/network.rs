//! Requester IP classification.

use std::net::IpAddr;

/// True for addresses that no IP-location upstream can place.
///
/// Covers loopback, RFC 1918 private ranges, link-local and unspecified
/// addresses, for both IPv4 and IPv6 (including unique-local `fc00::/7`).
pub fn is_local_or_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_local_or_private(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Parse a requester IP string, tolerating surrounding whitespace.
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}
