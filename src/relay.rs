use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{RelayEnd, TunnelError};

/// Interval at which the idle watchdog ticks.
pub const IDLE_TICK: Duration = Duration::from_secs(3);

/// Moves bytes in both directions between `client` and `target` until one
/// side closes, a socket fails, or `idle_ticks` watchdog intervals pass
/// without any traffic.
///
/// Partial writes are retried until the whole chunk is flushed; a truncated
/// chunk would corrupt the tunneled protocol irrecoverably.
pub async fn run<C, T>(
    client: C,
    target: T,
    buffer_size: usize,
    idle_ticks: u32,
) -> Result<RelayEnd, TunnelError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    // Incremented once per watchdog tick, cleared by either pump whenever a
    // chunk is relayed.
    let idle = AtomicU32::new(0);

    let client_to_target = async {
        let idle = &idle;
        let mut buffer = vec![0u8; buffer_size];
        loop {
            let n = client_read
                .read(&mut buffer)
                .await
                .map_err(TunnelError::SocketError)?;
            if n == 0 {
                return Ok(RelayEnd::PeerClosed);
            }
            target_write
                .write_all(&buffer[..n])
                .await
                .map_err(TunnelError::SocketError)?;
            debug!(bytes = n, "Forwarding data from client to target");
            idle.store(0, Ordering::Relaxed);
        }
    };

    let target_to_client = async {
        let idle = &idle;
        let mut buffer = vec![0u8; buffer_size];
        loop {
            let n = target_read
                .read(&mut buffer)
                .await
                .map_err(TunnelError::SocketError)?;
            if n == 0 {
                return Ok(RelayEnd::PeerClosed);
            }
            client_write
                .write_all(&buffer[..n])
                .await
                .map_err(TunnelError::SocketError)?;
            debug!(bytes = n, "Forwarding data from target to client");
            idle.store(0, Ordering::Relaxed);
        }
    };

    let watchdog = async {
        let idle = &idle;
        let mut ticks = tokio::time::interval(IDLE_TICK);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and must not count.
        ticks.tick().await;
        loop {
            ticks.tick().await;
            if idle.fetch_add(1, Ordering::Relaxed) + 1 >= idle_ticks {
                return RelayEnd::IdleTimeout;
            }
        }
    };

    tokio::select! {
        result = client_to_target => result,
        result = target_to_client => result,
        end = watchdog => Ok(end),
    }
}
