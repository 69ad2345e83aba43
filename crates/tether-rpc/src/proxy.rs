//! Remote provisioners behind the local contract.

use serde::Serialize;
use tracing::warn;

use crate::client::Client;
use crate::contract::{ResourceProvisioner, Validation};
use crate::error::{ApplicationError, ProtocolError, ProvisionerError, TransportError};
use crate::protocol::{ApplyArgs, Method, ResponseBody, ValidateArgs};
use crate::value::{ResourceConfig, ResourceState};

const PROXY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::proxy");

/// A [`ResourceProvisioner`] that forwards every call to a provisioner
/// registered on a remote server.
///
/// Many proxies may share one [`Client`]; each call blocks the calling
/// thread until its own response arrives. A `fault` answer becomes a
/// [`ProvisionerError::Protocol`], except that a call the server could not
/// parse is reported as [`TransportError::Malformed`].
#[derive(Debug, Clone)]
pub struct ProvisionerProxy {
    client: Client,
    name: String,
}

impl ProvisionerProxy {
    /// Creates a proxy for the provisioner registered under `name`.
    #[must_use]
    pub fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    /// Returns the registered name this proxy addresses.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call<A: Serialize>(
        &self,
        method: Method,
        arguments: &A,
    ) -> Result<ResponseBody, ProvisionerError> {
        let value = serde_json::to_value(arguments).map_err(TransportError::serialize)?;
        let body = self.client.call(&self.name, method, value)?;
        if let ResponseBody::Fault { error } = body {
            warn!(
                target: PROXY_TARGET,
                provisioner = %self.name,
                %method,
                error = %error,
                "remote call faulted"
            );
            return Err(error.into());
        }
        Ok(body)
    }
}

impl ResourceProvisioner for ProvisionerProxy {
    fn validate(&self, config: &ResourceConfig) -> Result<Validation, ProvisionerError> {
        let arguments = ValidateArgs {
            config: config.clone(),
        };
        match self.call(Method::Validate, &arguments)? {
            ResponseBody::Validated(validation) => Ok(validation),
            ResponseBody::Rejected { error } => Err(error.into()),
            other => Err(unexpected(Method::Validate, &other)),
        }
    }

    fn apply(
        &self,
        state: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<(), ProvisionerError> {
        let arguments = ApplyArgs {
            state: state.clone(),
            config: config.clone(),
        };
        match self.call(Method::Apply, &arguments)? {
            ResponseBody::Applied { error } => into_result(error),
            other => Err(unexpected(Method::Apply, &other)),
        }
    }

    fn stop(&self) -> Result<(), ProvisionerError> {
        match self.call(Method::Stop, &serde_json::Value::Null)? {
            ResponseBody::Stopped { error } => into_result(error),
            other => Err(unexpected(Method::Stop, &other)),
        }
    }
}

fn into_result(error: Option<ApplicationError>) -> Result<(), ProvisionerError> {
    error.map_or(Ok(()), |error| Err(error.into()))
}

fn unexpected(method: Method, body: &ResponseBody) -> ProvisionerError {
    ProtocolError::UnexpectedResponse {
        method: method.to_string(),
        received: body.kind_name().to_owned(),
    }
    .into()
}
