//! Wire envelopes exchanged between bridge clients and servers.
//!
//! Each connection carries JSONL in both directions. A client writes one
//! [`CallEnvelope`] line per call; the server answers each with one
//! [`ResponseEnvelope`] line carrying the same sequence number. Calls on a
//! connection may complete in any order.
//!
//! ```json
//! {"seq":1,"target":"provisioner-1","method":"validate","arguments":{"config":{"raw":{"foo":"bar"}}}}
//! {"seq":1,"body":{"kind":"validated","warnings":[],"errors":[]}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contract::Validation;
use crate::error::{ApplicationError, ProtocolError};
use crate::value::{ResourceConfig, ResourceState};

/// Operations that can be selected by a call envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// [`ResourceProvisioner::validate`](crate::ResourceProvisioner::validate).
    Validate,
    /// [`ResourceProvisioner::apply`](crate::ResourceProvisioner::apply).
    Apply,
    /// [`ResourceProvisioner::stop`](crate::ResourceProvisioner::stop).
    Stop,
}

impl Method {
    /// Returns the wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Apply => "apply",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        match selector {
            "validate" => Ok(Self::Validate),
            "apply" => Ok(Self::Apply),
            "stop" => Ok(Self::Stop),
            other => Err(ProtocolError::UnknownMethod {
                method: other.to_owned(),
            }),
        }
    }
}

/// A call addressed to a registered provisioner.
///
/// The method is kept as text so that an unknown selector is reported as a
/// protocol error for that call instead of a malformed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    seq: u64,
    target: String,
    method: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl CallEnvelope {
    /// Creates a call envelope.
    #[must_use]
    pub fn new(
        seq: u64,
        target: impl Into<String>,
        method: Method,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            seq,
            target: target.into(),
            method: method.as_str().to_owned(),
            arguments,
        }
    }

    /// Creates a call envelope with a raw method selector.
    #[must_use]
    pub fn with_selector(
        seq: u64,
        target: impl Into<String>,
        selector: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            seq,
            target: target.into(),
            method: selector.into(),
            arguments,
        }
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the registered name being called.
    #[must_use]
    pub const fn target(&self) -> &str {
        self.target.as_str()
    }

    /// Returns the raw method selector.
    #[must_use]
    pub const fn selector(&self) -> &str {
        self.method.as_str()
    }

    /// Resolves the method selector.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownMethod`] for unrecognised selectors.
    pub fn method(&self) -> Result<Method, ProtocolError> {
        self.method.parse()
    }

    /// Returns the serialised arguments.
    #[must_use]
    pub const fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }
}

/// Arguments of [`Method::Validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateArgs {
    /// Configuration to validate.
    pub config: ResourceConfig,
}

/// Arguments of [`Method::Apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyArgs {
    /// Current resource state.
    pub state: ResourceState,
    /// Configuration to apply.
    pub config: ResourceConfig,
}

/// The answer to one [`CallEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    seq: u64,
    body: ResponseBody,
}

impl ResponseEnvelope {
    /// Creates a response for the call with the given sequence number.
    #[must_use]
    pub const fn new(seq: u64, body: ResponseBody) -> Self {
        Self { seq, body }
    }

    /// Creates a protocol fault response.
    #[must_use]
    pub const fn fault(seq: u64, error: ProtocolError) -> Self {
        Self::new(seq, ResponseBody::Fault { error })
    }

    /// Returns the sequence number of the call being answered.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the response body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Consumes the envelope, returning its body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Result payload of a call.
///
/// Each method has its own success shape so cardinality survives the trip:
/// validation carries sequences, apply and stop carry one optional error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Result of [`Method::Validate`].
    Validated(Validation),
    /// Result of [`Method::Apply`].
    Applied {
        /// Application failure, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ApplicationError>,
    },
    /// Result of [`Method::Stop`].
    Stopped {
        /// Application failure, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ApplicationError>,
    },
    /// The implementation failed a call whose success shape has no error
    /// slot, such as validation refusing to run at all.
    Rejected {
        /// Application failure.
        error: ApplicationError,
    },
    /// The server could not complete the call.
    Fault {
        /// Protocol-level failure.
        error: ProtocolError,
    },
}

impl ResponseBody {
    /// Returns the wire name of the body kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Validated(_) => "validated",
            Self::Applied { .. } => "applied",
            Self::Stopped { .. } => "stopped",
            Self::Rejected { .. } => "rejected",
            Self::Fault { .. } => "fault",
        }
    }
}

/// Sequence number of an envelope that failed to decode in full, when the
/// line still carries one.
#[must_use]
pub(crate) fn recover_seq(line: &[u8]) -> Option<u64> {
    #[derive(Deserialize)]
    struct SeqOnly {
        seq: Option<u64>,
    }

    crate::codec::decode_line::<SeqOnly>(line)
        .ok()
        .and_then(|head| head.seq)
}
