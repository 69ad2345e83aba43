//! Shared configuration for Tether bridge servers and clients.
//!
//! The [`Config`] structure records where a bridge server listens, how long a
//! client waits for a response, how large a single envelope may grow, how
//! many calls a connection may run at once, and how telemetry is rendered.
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! named by `--config-path` or `TETHER_CONFIG_PATH`, then `TETHER_*`
//! environment variables, then command line flags.
//!
//! # Example
//!
//! ```no_run
//! use tether_config::{Config, LogFormat};
//!
//! let config = Config::load_validated(["tetherd", "--log-format", "compact"])
//!     .expect("valid configuration");
//! assert_eq!(config.log_format(), LogFormat::Compact);
//! ```

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_CONCURRENT_CALLS,
    DEFAULT_MAX_ENVELOPE_BYTES, DEFAULT_TCP_PORT, default_log_filter, default_log_format,
    default_socket_endpoint,
};
pub use self::logging::{LogFormat, LogFormatParseError};
pub use self::socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Endpoint the bridge server binds and clients connect to.
    #[serde(default = "defaults::default_socket_endpoint")]
    pub socket: SocketEndpoint,
    /// Time a client waits for a response before reporting a timeout.
    #[serde(default = "defaults::default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Upper bound on the size of a single JSONL envelope.
    #[serde(default = "defaults::default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    /// Calls a single connection may have in flight before the server stops
    /// reading from it.
    #[serde(default = "defaults::default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter")]
    pub log_filter: String,
    /// Output format for telemetry.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: defaults::default_socket_endpoint(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Loads the layered configuration from `args` and checks its limits.
    ///
    /// The first argument is the program name, as with `std::env::args_os`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be read or merged and
    /// [`ConfigError::Invalid`] when a merged value is out of range.
    pub fn load_validated<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::load_from_iter(args).map_err(|source| ConfigError::Load { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout, envelope limit, or
    /// call limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "call_timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if self.max_envelope_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_envelope_bytes",
                message: String::from("must be greater than zero"),
            });
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_calls",
                message: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Endpoint the bridge binds or connects to.
    #[must_use]
    pub const fn socket(&self) -> &SocketEndpoint {
        &self.socket
    }

    /// Client response timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Maximum envelope size in bytes.
    #[must_use]
    pub const fn max_envelope_bytes(&self) -> usize {
        self.max_envelope_bytes
    }

    /// Per-connection limit on calls in flight.
    #[must_use]
    pub const fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }

    /// Telemetry filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A configuration layer could not be read, parsed or merged.
    #[error("failed to load configuration: {source}")]
    Load {
        /// Aggregated loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// A merged value is out of range.
    #[error("invalid configuration value for '{field}': {message}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Description of the constraint.
        message: String,
    },
}
