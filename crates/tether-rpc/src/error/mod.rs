//! Error kinds raised across the provisioner bridge.
//!
//! Failures fall into three disjoint kinds so callers can decide whether a
//! retry makes sense:
//!
//! - [`TransportError`]: the connection broke, timed out, or carried an
//!   envelope that could not be framed or parsed. Raised locally by the
//!   client or the server, independent of any provisioner.
//! - [`ProtocolError`]: the server understood the connection but could not
//!   complete the call (unknown target, undecodable arguments, a panicking
//!   implementation). Serialised into `fault` responses.
//! - [`ApplicationError`]: a failure returned on purpose by provisioner logic,
//!   carried verbatim.
//!
//! I/O and JSON errors are wrapped in `Arc` so every error stays `Clone` and
//! small enough for the `result_large_err` Clippy lint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a [`ProvisionerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection failed; see [`TransportError`].
    Transport,
    /// The server rejected or could not complete the call; see [`ProtocolError`].
    Protocol,
    /// The provisioner reported a failure; see [`ApplicationError`].
    Application,
}

/// Failures of the byte stream between client and server.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The peer closed the connection before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived within the configured timeout.
    #[error("no response within {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Reading from or writing to the connection failed.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An envelope exceeded the configured size limit.
    #[error("envelope too large: {size} bytes exceeds {max_size} byte limit")]
    EnvelopeTooLarge {
        /// Bytes read before the limit was hit.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// An envelope on the connection could not be parsed, either a response
    /// read by the client or a call the server reported as unreadable.
    #[error("malformed envelope: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
    },

    /// An outgoing envelope could not be serialised.
    #[error("failed to serialise envelope: {source}")]
    Serialize {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl TransportError {
    /// Wraps an I/O error.
    #[must_use]
    pub fn io(source: std::io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }

    /// Wraps a serialisation error.
    #[must_use]
    pub fn serialize(source: serde_json::Error) -> Self {
        Self::Serialize {
            source: Arc::new(source),
        }
    }
}

/// Call failures reported by the dispatcher rather than the provisioner.
///
/// These travel inside `fault` response bodies, so the type is serialisable
/// and carries only owned text.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ProtocolError {
    /// No implementation is registered under the requested name.
    #[error("unknown target '{name}'")]
    UnknownTarget {
        /// Name that was looked up.
        name: String,
    },

    /// The method selector names no operation of the contract.
    #[error("unknown method '{method}'")]
    UnknownMethod {
        /// Selector that was received.
        method: String,
    },

    /// A call envelope could not be parsed.
    ///
    /// This is how the server reports the failure on the wire; callers see
    /// it as [`TransportError::Malformed`].
    #[error("malformed envelope: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
    },

    /// Call arguments did not match the method's schema.
    #[error("failed to decode arguments for '{method}': {message}")]
    Decode {
        /// Method whose arguments were rejected.
        method: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The implementation panicked while serving the call.
    #[error("provisioner '{target}' panicked during '{method}': {message}")]
    ImplementationPanicked {
        /// Registered name of the implementation.
        target: String,
        /// Method being served.
        method: String,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A response body did not match the method that was called.
    #[error("unexpected '{received}' response to '{method}'")]
    UnexpectedResponse {
        /// Method that was called.
        method: String,
        /// Kind of body that arrived.
        received: String,
    },

    /// The server could not start serving the call.
    #[error("server could not start the call: {message}")]
    Unavailable {
        /// Why the call could not be started.
        message: String,
    },

    /// The implementation itself failed with a bridge error, typically
    /// because it forwards to another remote provisioner.
    #[error("remote bridge failure: {message}")]
    Remote {
        /// Rendered upstream error.
        message: String,
    },
}

/// A failure returned on purpose by provisioner logic.
///
/// The message is carried verbatim across the bridge and is the whole of the
/// error's `Display` output.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[error("{message}")]
pub struct ApplicationError {
    message: String,
}

impl ApplicationError {
    /// Creates an application error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message text.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Any failure observable by a caller of the provisioner contract.
#[derive(Debug, Clone, Error)]
pub enum ProvisionerError {
    /// See [`TransportError`].
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// See [`ProtocolError`].
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// See [`ApplicationError`].
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<ProtocolError> for ProvisionerError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Malformed { message } => {
                Self::Transport(TransportError::Malformed { message })
            }
            other => Self::Protocol(other),
        }
    }
}

impl ProvisionerError {
    /// Creates an application error from a message.
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(ApplicationError::new(message))
    }

    /// Returns the kind of failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Application(_) => ErrorKind::Application,
        }
    }

    /// Returns `true` when the failure happened on the connection itself, so
    /// a caller may reasonably retry on a fresh connection. The bridge never
    /// retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the application error, if this is one.
    #[must_use]
    pub const fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            Self::Application(error) => Some(error),
            Self::Transport(_) | Self::Protocol(_) => None,
        }
    }
}

/// Errors raised while registering provisioners.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already bound to another implementation.
    #[error("provisioner '{name}' is already registered")]
    DuplicateName {
        /// Name that collided.
        name: String,
    },

    /// The name is empty or otherwise unusable.
    #[error("invalid provisioner name: {message}")]
    InvalidName {
        /// Description of the problem.
        message: String,
    },
}
