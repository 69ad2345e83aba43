//! Serving registered provisioners over bridge connections.
//!
//! A [`Server`] owns a [`ProvisionerRegistry`] and serves any number of
//! connections against it. Each connection is read by one thread; every
//! call read from it is dispatched on a thread of its own and its response
//! is written back through a writer shared by the connection's calls, so a
//! slow call never holds up the others. Once a connection has
//! [`ServerOptions::max_concurrent_calls`] calls in flight, its reader waits
//! for the oldest to finish before reading more.

mod dispatcher;

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufReader};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use tether_config::{
    Config, DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_MAX_ENVELOPE_BYTES, SocketEndpoint,
};

pub use self::dispatcher::dispatch;
use crate::codec::{decode_line, read_line, write_line};
use crate::contract::ResourceProvisioner;
use crate::error::{ProtocolError, RegistryError};
use crate::protocol::{CallEnvelope, ResponseEnvelope, recover_seq};
use crate::registry::ProvisionerRegistry;
use crate::transport::{self, ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Tunables for serving connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Largest call envelope accepted, in bytes. A longer line ends the
    /// connection.
    pub max_envelope_bytes: usize,
    /// Calls one connection may have in flight at once.
    pub max_concurrent_calls: usize,
}

impl ServerOptions {
    /// Takes the options from loaded configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            max_envelope_bytes: config.max_envelope_bytes(),
            max_concurrent_calls: config.max_concurrent_calls(),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
        }
    }
}

/// Bridge server multiplexing registered provisioners.
///
/// Clones share the registry and the set of open connections.
#[derive(Debug, Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    registry: ProvisionerRegistry,
    options: ServerOptions,
    connections: Mutex<Connections>,
}

#[derive(Debug, Default)]
struct Connections {
    closed: bool,
    next_id: u64,
    open: HashMap<u64, ConnectionStream>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerOptions::default())
    }
}

impl Server {
    /// Creates a server with an empty registry.
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: ProvisionerRegistry::new(),
                options,
                connections: Mutex::new(Connections::default()),
            }),
        }
    }

    /// Returns the registry served by this server.
    #[must_use]
    pub fn registry(&self) -> &ProvisionerRegistry {
        &self.shared.registry
    }

    /// Returns the options the server was created with.
    #[must_use]
    pub fn options(&self) -> ServerOptions {
        self.shared.options
    }

    /// Registers an implementation and returns the name clients address it by.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistryError`] from the registry.
    pub fn register(
        &self,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Result<String, RegistryError> {
        self.shared.registry.register(provisioner)
    }

    /// Binds `endpoint` and serves every accepted connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the endpoint cannot be bound.
    pub fn listen(&self, endpoint: &SocketEndpoint) -> Result<ListenerHandle, ListenerError> {
        transport::listen(endpoint, Arc::new(self.clone()))
    }

    /// Serves one connection until the peer disconnects, the connection
    /// fails, or the server is shut down.
    ///
    /// Returns once every call read from the connection has been answered.
    pub fn serve_connection(&self, stream: ConnectionStream) {
        let Some(connection_id) = self.track(&stream) else {
            debug!(target: SERVER_TARGET, "refusing connection on closed server");
            if let Err(error) = stream.shutdown() {
                debug!(
                    target: SERVER_TARGET,
                    error = %error,
                    "failed to close refused connection"
                );
            }
            return;
        };
        let writer = match stream.try_clone() {
            Ok(writer) => Arc::new(Mutex::new(writer)),
            Err(error) => {
                warn!(target: SERVER_TARGET, error = %error, "failed to clone connection");
                self.untrack(connection_id);
                return;
            }
        };

        debug!(target: SERVER_TARGET, connection = connection_id, "serving connection");
        let mut reader = BufReader::new(stream);
        let mut calls: VecDeque<JoinHandle<()>> = VecDeque::new();
        loop {
            let line = match read_line(&mut reader, self.shared.options.max_envelope_bytes) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    warn!(
                        target: SERVER_TARGET,
                        connection = connection_id,
                        error = %error,
                        "closing connection"
                    );
                    break;
                }
            };
            if line.trim_ascii().is_empty() {
                continue;
            }
            calls.retain(|call| !call.is_finished());
            match decode_line::<CallEnvelope>(&line) {
                Ok(call) => {
                    wait_for_capacity(&mut calls, self.shared.options.max_concurrent_calls);
                    let seq = call.seq();
                    match self.start_call(call, &writer) {
                        Ok(handle) => calls.push_back(handle),
                        Err(error) => {
                            warn!(
                                target: SERVER_TARGET,
                                connection = connection_id,
                                seq,
                                error = %error,
                                "failed to start call thread"
                            );
                            send(&writer, &call_refused(seq, &error));
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        target: SERVER_TARGET,
                        connection = connection_id,
                        error = %error,
                        "malformed call envelope"
                    );
                    let response = ResponseEnvelope::fault(
                        recover_seq(&line).unwrap_or(0),
                        ProtocolError::Malformed {
                            message: error.to_string(),
                        },
                    );
                    send(&writer, &response);
                }
            }
        }

        calls.into_iter().for_each(join_call);
        self.untrack(connection_id);
        debug!(target: SERVER_TARGET, connection = connection_id, "connection finished");
    }

    /// Closes every open connection and refuses new ones.
    ///
    /// Clients with calls in flight observe the connection closing. Stopping
    /// a listener started with [`Server::listen`] is up to its handle.
    pub fn shutdown(&self) {
        let mut connections = self.connections();
        connections.closed = true;
        for (id, stream) in connections.open.drain() {
            if let Err(error) = stream.shutdown() {
                warn!(
                    target: SERVER_TARGET,
                    connection = id,
                    error = %error,
                    "failed to close connection"
                );
            }
        }
    }

    /// Returns `true` once [`Server::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.connections().closed
    }

    fn start_call(
        &self,
        call: CallEnvelope,
        writer: &Arc<Mutex<ConnectionStream>>,
    ) -> io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let call_writer = Arc::clone(writer);
        thread::Builder::new()
            .name(format!("tether-call-{}", call.seq()))
            .spawn(move || {
                let response = dispatch(&shared.registry, &call);
                send(&call_writer, &response);
            })
    }

    fn track(&self, stream: &ConnectionStream) -> Option<u64> {
        let mut connections = self.connections();
        if connections.closed {
            return None;
        }
        let handle = stream.try_clone().ok()?;
        connections.next_id += 1;
        let id = connections.next_id;
        connections.open.insert(id, handle);
        Some(id)
    }

    fn untrack(&self, id: u64) {
        self.connections().open.remove(&id);
    }

    fn connections(&self) -> MutexGuard<'_, Connections> {
        self.shared
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConnectionHandler for Server {
    fn handle(&self, stream: ConnectionStream) {
        self.serve_connection(stream);
    }
}

/// Registers an implementation on a server, returning its generated name.
///
/// # Errors
///
/// Propagates [`RegistryError`] from the registry.
pub fn register(
    server: &Server,
    provisioner: Arc<dyn ResourceProvisioner>,
) -> Result<String, RegistryError> {
    server.register(provisioner)
}

/// Blocks until fewer than `limit` calls are in flight.
fn wait_for_capacity(calls: &mut VecDeque<JoinHandle<()>>, limit: usize) {
    while calls.len() >= limit.max(1) {
        if let Some(oldest) = calls.pop_front() {
            join_call(oldest);
        }
        calls.retain(|call| !call.is_finished());
    }
}

fn join_call(call: JoinHandle<()>) {
    if call.join().is_err() {
        warn!(target: SERVER_TARGET, "call thread panicked");
    }
}

/// Answer for a call the server could not start.
fn call_refused(seq: u64, error: &io::Error) -> ResponseEnvelope {
    ResponseEnvelope::fault(
        seq,
        ProtocolError::Unavailable {
            message: error.to_string(),
        },
    )
}

fn send(writer: &Mutex<ConnectionStream>, response: &ResponseEnvelope) {
    let mut stream = writer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(error) = write_line(&mut *stream, response) {
        warn!(
            target: SERVER_TARGET,
            seq = response.seq(),
            error = %error,
            "failed to write response"
        );
    }
}
