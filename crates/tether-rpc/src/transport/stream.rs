//! Connected byte streams.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use tether_config::SocketEndpoint;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connected bridge stream over TCP or a Unix domain socket.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Opens a second handle to the same connection.
    ///
    /// # Errors
    ///
    /// Returns the operating system error when the handle cannot be
    /// duplicated.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Shuts down both directions of the connection, waking any reader
    /// blocked on another handle.
    ///
    /// # Errors
    ///
    /// Returns the operating system error, except for `NotConnected`, which
    /// means the peer already went away.
    pub fn shutdown(&self) -> io::Result<()> {
        let result = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves a single connection until it ends. Implementations should
    /// avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Opens a client connection to an endpoint.
///
/// # Errors
///
/// Returns the connect failure, or `Unsupported` for Unix endpoints on
/// platforms without Unix sockets.
pub fn connect(endpoint: &SocketEndpoint) -> io::Result<ConnectionStream> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))?;
            stream.set_nodelay(true)?;
            Ok(ConnectionStream::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                UnixStream::connect(path.as_std_path()).map(ConnectionStream::Unix)
            }

            #[cfg(not(unix))]
            {
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unix sockets are unsupported for {path}"),
                ))
            }
        }
    }
}
