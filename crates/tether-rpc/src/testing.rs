//! In-process client and server pairs for tests.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::thread;

use crate::client::{Client, ClientOptions};
use crate::server::Server;
use crate::transport::ConnectionStream;

/// Connects a fresh [`Client`] to a fresh [`Server`] over TCP loopback.
///
/// The server serves the connection on a background thread. Register
/// implementations on the returned server, then build
/// [`ProvisionerProxy`](crate::ProvisionerProxy) values from the client.
/// Calling [`Server::shutdown`] drops the connection.
///
/// # Errors
///
/// Returns the I/O error if the loopback connection cannot be set up.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tether_rpc::{MockProvisioner, ProvisionerProxy, ResourceConfig, ResourceProvisioner};
/// use tether_rpc::testing::connected_pair;
///
/// let (client, server) = connected_pair().expect("pair");
/// let mock = Arc::new(MockProvisioner::new());
/// let name = server.register(mock.clone()).expect("register");
/// let proxy = ProvisionerProxy::new(client, name);
/// proxy.validate(&ResourceConfig::default()).expect("validate");
/// assert!(mock.validate_called());
/// ```
pub fn connected_pair() -> io::Result<(Client, Server)> {
    connected_pair_with(Server::default(), ClientOptions::default())
}

/// Like [`connected_pair`], with a caller-supplied server and client
/// options.
///
/// # Errors
///
/// Returns the I/O error if the loopback connection cannot be set up.
pub fn connected_pair_with(
    server: Server,
    options: ClientOptions,
) -> io::Result<(Client, Server)> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let stream = TcpStream::connect(listener.local_addr()?)?;
    let (accepted, _) = listener.accept()?;

    let serving = server.clone();
    thread::Builder::new()
        .name(String::from("tether-test-server"))
        .spawn(move || serving.serve_connection(ConnectionStream::Tcp(accepted)))?;

    let client = Client::new(ConnectionStream::Tcp(stream), options)
        .map_err(|error| io::Error::other(error.to_string()))?;
    Ok((client, server))
}
