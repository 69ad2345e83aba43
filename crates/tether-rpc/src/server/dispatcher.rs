//! Routing of decoded calls to registered provisioners.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::SERVER_TARGET;
use crate::contract::ResourceProvisioner;
use crate::error::{ApplicationError, ProtocolError, ProvisionerError};
use crate::protocol::{
    ApplyArgs, CallEnvelope, Method, ResponseBody, ResponseEnvelope, ValidateArgs,
};
use crate::registry::ProvisionerRegistry;

/// Serves one call against the registry and builds its response.
///
/// Every failure the server can attribute to the call itself becomes a
/// `fault` body carrying the call's sequence number, so a bad call never
/// affects other calls or the connection:
///
/// - the target is not registered, or the selector names no method;
/// - the arguments do not decode into the method's parameter types;
/// - the implementation panics;
/// - the implementation fails with a transport or protocol error of its own.
///
/// Application errors are returned inside the method's own result shape.
#[must_use]
pub fn dispatch(registry: &ProvisionerRegistry, call: &CallEnvelope) -> ResponseEnvelope {
    let seq = call.seq();
    let body = route(registry, call).unwrap_or_else(|error| {
        warn!(
            target: SERVER_TARGET,
            seq,
            provisioner = call.target(),
            method = call.selector(),
            error = %error,
            "call failed"
        );
        ResponseBody::Fault { error }
    });
    debug!(
        target: SERVER_TARGET,
        seq,
        provisioner = call.target(),
        method = call.selector(),
        kind = body.kind_name(),
        "call completed"
    );
    ResponseEnvelope::new(seq, body)
}

fn route(
    registry: &ProvisionerRegistry,
    call: &CallEnvelope,
) -> Result<ResponseBody, ProtocolError> {
    let provisioner = registry
        .get(call.target())
        .ok_or_else(|| ProtocolError::UnknownTarget {
            name: call.target().to_owned(),
        })?;
    let method = call.method()?;
    invoke(provisioner.as_ref(), call.target(), method, call.arguments())
}

fn invoke(
    provisioner: &dyn ResourceProvisioner,
    target: &str,
    method: Method,
    arguments: &serde_json::Value,
) -> Result<ResponseBody, ProtocolError> {
    match method {
        Method::Validate => {
            let ValidateArgs { config } = decode_arguments(method, arguments)?;
            match guarded(target, method, || provisioner.validate(&config))? {
                Ok(validation) => Ok(ResponseBody::Validated(validation)),
                Err(error) => Ok(ResponseBody::Rejected {
                    error: into_application(error)?,
                }),
            }
        }
        Method::Apply => {
            let ApplyArgs { state, config } = decode_arguments(method, arguments)?;
            let result = guarded(target, method, || provisioner.apply(&state, &config))?;
            Ok(ResponseBody::Applied {
                error: result.err().map(into_application).transpose()?,
            })
        }
        Method::Stop => {
            let result = guarded(target, method, || provisioner.stop())?;
            Ok(ResponseBody::Stopped {
                error: result.err().map(into_application).transpose()?,
            })
        }
    }
}

fn decode_arguments<T: DeserializeOwned>(
    method: Method,
    arguments: &serde_json::Value,
) -> Result<T, ProtocolError> {
    T::deserialize(arguments).map_err(|error| ProtocolError::Decode {
        method: method.to_string(),
        message: error.to_string(),
    })
}

/// Application errors pass through; anything else came from a bridge the
/// implementation itself depends on and is reported as a remote failure.
fn into_application(error: ProvisionerError) -> Result<ApplicationError, ProtocolError> {
    match error {
        ProvisionerError::Application(error) => Ok(error),
        other @ (ProvisionerError::Transport(_) | ProvisionerError::Protocol(_)) => {
            Err(ProtocolError::Remote {
                message: other.to_string(),
            })
        }
    }
}

fn guarded<T>(target: &str, method: Method, call: impl FnOnce() -> T) -> Result<T, ProtocolError> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        ProtocolError::ImplementationPanicked {
            target: target.to_owned(),
            method: method.to_string(),
            message: panic_message(payload.as_ref()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("non-string panic payload")
}
