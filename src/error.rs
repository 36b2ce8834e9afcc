use std::io;
use thiserror::Error;

/// Failure conditions that can end a tunneled connection. Each one is
/// contained to the connection it arose on; the listener never sees them.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("client sent an empty initial request")]
    EmptyRequest,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("target {target} unreachable: {source}")]
    TargetUnreachable { target: String, source: io::Error },

    #[error("socket error during relay: {0}")]
    SocketError(#[from] io::Error),
}

/// How a relay session ended when nothing actually failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// One side signalled EOF.
    PeerClosed,
    /// No data moved in either direction for the configured number of ticks.
    IdleTimeout,
}
