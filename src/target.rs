use std::io;
use tokio::net::{TcpStream, lookup_host};
use tracing::debug;

use crate::error::TunnelError;

/// Splits `host[:port]` on the last colon. When no port is given the default
/// is 443 for CONNECT-style requests and 80 otherwise.
pub fn parse_host_port(host_port: &str, connect_method: bool) -> Result<(String, u16), TunnelError> {
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| {
                unreachable_error(host_port, io::Error::new(io::ErrorKind::InvalidInput, e))
            })?;
            Ok((host.to_string(), port))
        }
        None => {
            let port = if connect_method { 443 } else { 80 };
            Ok((host_port.to_string(), port))
        }
    }
}

/// Opens the outbound leg of a tunnel.
///
/// The first resolved address is authoritative; there is no fallback to later
/// addresses. Failures carry the io error for the server log only and are
/// never detailed to the client.
pub async fn connect(host_port: &str, connect_method: bool) -> Result<TcpStream, TunnelError> {
    let (host, port) = parse_host_port(host_port, connect_method)?;

    let addr = lookup_host((host.as_str(), port))
        .await
        .map_err(|e| unreachable_error(host_port, e))?
        .next()
        .ok_or_else(|| {
            unreachable_error(
                host_port,
                io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            )
        })?;

    debug!(target_addr = %addr, "Attempting to connect to target");
    TcpStream::connect(addr)
        .await
        .map_err(|e| unreachable_error(host_port, e))
}

fn unreachable_error(target: &str, source: io::Error) -> TunnelError {
    TunnelError::TargetUnreachable {
        target: target.to_string(),
        source,
    }
}
