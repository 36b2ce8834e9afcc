use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::TunnelConfig;
use crate::error::{RelayEnd, TunnelError};
use crate::relay;
use crate::request::{FORBIDDEN_RESPONSE, HANDSHAKE_RESPONSE, RequestContext};
use crate::security::authenticate;
use crate::target;

/// Serves one accepted client connection end to end: read the initial
/// request, authenticate, connect the target, acknowledge the handshake and
/// relay until the session ends. Both sockets close when this returns, on
/// every path.
#[tracing::instrument(skip_all, fields(client_addr = %peer))]
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<TunnelConfig>,
) -> Result<(), TunnelError> {
    let mut buffer = vec![0u8; config.buffer_size];
    let n = stream.read(&mut buffer).await?;
    if n == 0 {
        return Err(TunnelError::EmptyRequest);
    }

    let request = RequestContext::parse(&buffer[..n], &config);
    if request.split {
        // The disguised client sends its real payload in a follow-up packet;
        // drain and discard it before the handshake proceeds.
        debug!("Split request, draining second packet");
        let _ = stream.read(&mut buffer).await?;
    }

    if !authenticate(&request, &config.secret) {
        stream.write_all(FORBIDDEN_RESPONSE).await?;
        return Err(TunnelError::AuthenticationFailed);
    }

    let target_stream = target::connect(&request.host_port, request.connect_method).await?;

    // Only acknowledged once the target is confirmed reachable, so the
    // client never sees a false "connected" signal.
    stream.write_all(HANDSHAKE_RESPONSE).await?;
    info!(target = %request.host_port, "Tunnel established");

    match relay::run(stream, target_stream, config.buffer_size, config.idle_ticks).await? {
        RelayEnd::PeerClosed => info!("Connection closed by the other end"),
        RelayEnd::IdleTimeout => info!("Idle timeout reached for the connection"),
    }
    Ok(())
}
