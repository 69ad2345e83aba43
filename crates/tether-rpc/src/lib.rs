//! Out-of-process provisioner bridge for Tether.
//!
//! The `tether-rpc` crate lets an orchestration engine drive resource
//! provisioners that live in another process as if they were local objects.
//! Provisioner logic implements [`ResourceProvisioner`] and is registered on
//! a [`Server`]; the engine talks to it through a [`ProvisionerProxy`], which
//! implements the very same trait over a [`Client`] connection.
//!
//! # Architecture
//!
//! Client and server exchange single-line JSON envelopes over a TCP or Unix
//! socket. Every call carries a sequence number, so one connection carries
//! many concurrent calls and responses may arrive in any order. On the
//! server each call runs on its own thread against the named provisioner in
//! the [`ProvisionerRegistry`]; a panic or a bad call only fails that call.
//!
//! Failures are split three ways (see [`ErrorKind`]): transport errors from
//! the connection, protocol errors from the dispatcher, and application
//! errors returned on purpose by provisioner logic. Validation keeps its
//! warnings and errors as two independent lists of exact length.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_config::SocketEndpoint;
//! use tether_rpc::{
//!     Client, ClientOptions, ProvisionerProxy, ResourceConfig, ResourceProvisioner, Server,
//! };
//! # use tether_rpc::{ProvisionerError, ResourceState, Validation};
//! # struct Shell;
//! # impl ResourceProvisioner for Shell {
//! #     fn validate(&self, _: &ResourceConfig) -> Result<Validation, ProvisionerError> { Ok(Validation::ok()) }
//! #     fn apply(&self, _: &ResourceState, _: &ResourceConfig) -> Result<(), ProvisionerError> { Ok(()) }
//! #     fn stop(&self) -> Result<(), ProvisionerError> { Ok(()) }
//! # }
//!
//! // Plugin process.
//! let server = Server::default();
//! let name = server.register(Arc::new(Shell)).expect("register");
//! let listener = server
//!     .listen(&SocketEndpoint::unix("/run/tether/shell.sock"))
//!     .expect("listen");
//!
//! // Engine process.
//! let client = Client::connect(listener.endpoint(), ClientOptions::default()).expect("connect");
//! let shell: Arc<dyn ResourceProvisioner> = Arc::new(ProvisionerProxy::new(client, name));
//! let outcome = shell.validate(&ResourceConfig::default()).expect("validate");
//! assert!(outcome.is_valid());
//! ```

pub mod client;
pub mod codec;
pub mod contract;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;
pub mod value;

#[cfg(test)]
mod tests;

pub use self::client::{Client, ClientOptions};
pub use self::contract::{ResourceProvisioner, Validation};
pub use self::error::{
    ApplicationError, ErrorKind, ProtocolError, ProvisionerError, RegistryError, TransportError,
};
#[cfg(any(test, feature = "test-support"))]
pub use self::mock::MockProvisioner;
pub use self::protocol::{CallEnvelope, Method, ResponseBody, ResponseEnvelope};
pub use self::proxy::ProvisionerProxy;
pub use self::registry::ProvisionerRegistry;
pub use self::server::{Server, ServerOptions, dispatch, register};
pub use self::transport::{ConnectionStream, ListenerError, ListenerHandle};
pub use self::value::{
    AttributeDiff, ConfigValue, DiffAttrType, ResourceConfig, ResourceDiff, ResourceState,
};
