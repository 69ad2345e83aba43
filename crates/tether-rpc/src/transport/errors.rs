//! Failures of binding a bridge endpoint.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding or running a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The socket could not be bound.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// Rendered endpoint.
        endpoint: String,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Reading back the bound address failed.
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The socket's parent directory could not be prepared.
    #[error(transparent)]
    Prepare(#[from] tether_config::SocketPreparationError),
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Rendered endpoint.
        endpoint: String,
    },
    /// A live server already answers on the socket.
    #[error("unix socket {path} is already in use")]
    InUse {
        /// Socket path.
        path: String,
    },
    /// The path exists but is not a socket.
    #[error("unix socket path {path} is not a socket")]
    NotSocket {
        /// Offending path.
        path: String,
    },
    /// A stale socket file could not be removed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    StaleSocket {
        /// Socket path.
        path: String,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("failed to start accept thread: {source}")]
    Spawn {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept loop panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
