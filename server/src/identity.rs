//! Anonymised peer identity derived from the remote address

use std::net::{IpAddr, SocketAddr};

/// Used when the remote address cannot be resolved at all
pub const UNKNOWN_IDENTITY: &str = "UNKNOWN";
/// Used for addresses that have no IPv4 form
pub const ANONYMOUS_IDENTITY: &str = "Anonymous";

/// Masks the second and fourth octet of an IPv4 address: `a.***.c.***`.
///
/// IPv4-mapped IPv6 addresses are unwrapped first. The port never takes part,
/// so every connection from one host yields the same identity.
pub fn mask_ip(addr: Option<SocketAddr>) -> String {
    let ip = match addr {
        Some(addr) => addr.ip(),
        None => return UNKNOWN_IDENTITY.to_string(),
    };

    let v4 = match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    };

    match v4 {
        Some(v4) => {
            let octets = v4.octets();
            format!("{}.***.{}.***", octets[0], octets[2])
        }
        None => ANONYMOUS_IDENTITY.to_string(),
    }
}
