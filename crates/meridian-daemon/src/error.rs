//! Daemon runtime errors.

use thiserror::Error;

use meridian_proto::{DaemonId, ProtocolError, RpcError};

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors raised by the daemon runtime and client.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] meridian_core::TransportError),

    /// Framing or serialisation failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The daemon answered with an error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The daemon did not answer within the request timeout.
    #[error("daemon {daemon} timed out")]
    Timeout { daemon: DaemonId },

    /// The daemon answered with an unexpected response variant.
    #[error("daemon {daemon} sent an unexpected response")]
    UnexpectedResponse { daemon: DaemonId },

    /// Pidfile could not be written or removed.
    #[error("pidfile error: {0}")]
    Pidfile(#[source] std::io::Error),

    /// No endpoint registered for the daemon.
    #[error("daemon {daemon} is not in the registry")]
    Unregistered { daemon: DaemonId },
}
