use anyhow::{Result, anyhow};
use ipnet::IpNet;
use std::net::IpAddr;

use crate::request::RequestContext;

/// Decides whether a handshake may proceed.
///
/// With a configured secret the client's `X-Pass` value must match it exactly,
/// byte for byte. Without one, only loopback targets are permitted so that an
/// open instance cannot be used as a general-purpose relay.
#[must_use]
pub fn authenticate(request: &RequestContext, secret: &str) -> bool {
    if !secret.is_empty() {
        return request.secret.as_deref() == Some(secret);
    }
    request.host_port.starts_with("127.0.0.1") || request.host_port.starts_with("localhost")
}

/// Checks if a client IP address is allowed based on the configured allowlist
/// Returns true if no allowlist is configured (allow all) or if IP matches any entry
pub fn is_client_ip_allowed(client_ip: IpAddr, allowed_ips: Option<&[String]>) -> Result<bool> {
    let Some(allowed_list) = allowed_ips else {
        return Ok(true); // No restrictions configured
    };

    for allowed_entry in allowed_list {
        // Try parsing as individual IP address first
        if let Ok(allowed_ip) = allowed_entry.parse::<IpAddr>() {
            if client_ip == allowed_ip {
                return Ok(true);
            }
        }
        // Try parsing as CIDR subnet
        else if let Ok(allowed_net) = allowed_entry.parse::<IpNet>() {
            if allowed_net.contains(&client_ip) {
                return Ok(true);
            }
        } else {
            return Err(anyhow!(
                "Invalid IP address or CIDR in allowed_client_ips: {}",
                allowed_entry
            ));
        }
    }

    Ok(false)
}
