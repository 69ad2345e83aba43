//! Accepting bridge connections on a bound endpoint.

use std::fs;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

#[cfg(unix)]
use camino::Utf8Path;
use tracing::{debug, info, warn};

use tether_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, ListenerError, TRANSPORT_TARGET, connect};

/// Pause after a failed `accept` so a persistent failure does not spin.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundSocket {
    fn accept(&self) -> io::Result<ConnectionStream> {
        match self {
            Self::Tcp(listener) => listener
                .accept()
                .map(|(stream, _)| ConnectionStream::Tcp(stream)),
            #[cfg(unix)]
            Self::Unix(listener) => listener
                .accept()
                .map(|(stream, _)| ConnectionStream::Unix(stream)),
        }
    }
}

/// Binds `endpoint` and hands every accepted connection to `handler` on a
/// thread of its own.
///
/// TCP port `0` picks a free port; [`ListenerHandle::endpoint`] reports the
/// one actually bound. A Unix socket file left by a server that is no longer
/// running is replaced, and the file is removed once accepting stops.
///
/// # Errors
///
/// Returns a [`ListenerError`] when the endpoint cannot be bound, a live
/// server already owns the Unix socket, or the accept thread cannot start.
pub fn listen(
    endpoint: &SocketEndpoint,
    handler: Arc<dyn ConnectionHandler>,
) -> Result<ListenerHandle, ListenerError> {
    let (socket, bound) = bind(endpoint)?;
    let stopping = Arc::new(AtomicBool::new(false));
    let spawned = {
        let loop_endpoint = bound.clone();
        let loop_stopping = Arc::clone(&stopping);
        thread::Builder::new()
            .name(String::from("tether-accept"))
            .spawn(move || accept_until_stopped(&socket, &loop_endpoint, &loop_stopping, &handler))
    };
    match spawned {
        Ok(accept_loop) => Ok(ListenerHandle {
            endpoint: bound,
            stopping,
            accept_loop: Some(accept_loop),
        }),
        Err(source) => {
            remove_socket_file(&bound);
            Err(ListenerError::Spawn { source })
        }
    }
}

/// A running accept loop.
///
/// Stopping it, explicitly or by dropping the handle, only stops new
/// connections; those already accepted keep being served.
#[derive(Debug)]
pub struct ListenerHandle {
    endpoint: SocketEndpoint,
    stopping: Arc<AtomicBool>,
    accept_loop: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Returns the endpoint clients should connect to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        // The accept loop is blocked in `accept`; a throwaway connection
        // wakes it so it can observe the flag.
        if let Err(error) = connect(&self.endpoint) {
            debug!(
                target: TRANSPORT_TARGET,
                endpoint = %self.endpoint,
                error = %error,
                "failed to wake accept loop"
            );
        }
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        self.shutdown();
        self.accept_loop.take().map_or(Ok(()), |accept_loop| {
            accept_loop.join().map_err(|_| ListenerError::ThreadPanic)
        })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind(endpoint: &SocketEndpoint) -> Result<(BoundSocket, SocketEndpoint), ListenerError> {
    let bind_error = |source| ListenerError::Bind {
        endpoint: endpoint.to_string(),
        source,
    };
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let listener = TcpListener::bind((host.as_str(), *port)).map_err(bind_error)?;
            let addr = listener
                .local_addr()
                .map_err(|source| ListenerError::LocalAddr { source })?;
            let bound = SocketEndpoint::tcp(addr.ip().to_string(), addr.port());
            Ok((BoundSocket::Tcp(listener), bound))
        }
        #[cfg(unix)]
        SocketEndpoint::Unix { path } => {
            endpoint.prepare_filesystem()?;
            claim_unix_path(path)?;
            let listener = UnixListener::bind(path).map_err(bind_error)?;
            Ok((BoundSocket::Unix(listener), endpoint.clone()))
        }
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => Err(ListenerError::UnsupportedUnix {
            endpoint: endpoint.to_string(),
        }),
    }
}

/// Clears the way for binding `path`: a socket nobody answers on is stale and
/// removed, a socket that accepts a connection belongs to a live server.
#[cfg(unix)]
fn claim_unix_path(path: &Utf8Path) -> Result<(), ListenerError> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotSocket {
            path: path.to_string(),
        });
    }
    if UnixStream::connect(path).is_ok() {
        return Err(ListenerError::InUse {
            path: path.to_string(),
        });
    }
    debug!(target: TRANSPORT_TARGET, path = %path, "removing stale socket file");
    fs::remove_file(path).map_err(|source| ListenerError::StaleSocket {
        path: path.to_string(),
        source,
    })
}

fn accept_until_stopped(
    socket: &BoundSocket,
    endpoint: &SocketEndpoint,
    stopping: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(target: TRANSPORT_TARGET, endpoint = %endpoint, "accepting connections");
    loop {
        let accepted = socket.accept();
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        match accepted {
            Ok(stream) => {
                let connection_handler = Arc::clone(handler);
                let started = thread::Builder::new()
                    .name(String::from("tether-connection"))
                    .spawn(move || connection_handler.handle(stream));
                if let Err(error) = started {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "failed to start connection thread, dropping connection"
                    );
                }
            }
            Err(error) => {
                warn!(target: TRANSPORT_TARGET, error = %error, "accept failed");
                thread::sleep(ACCEPT_RETRY);
            }
        }
    }
    remove_socket_file(endpoint);
    info!(target: TRANSPORT_TARGET, endpoint = %endpoint, "stopped accepting connections");
}

fn remove_socket_file(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            path = %path,
            error = %error,
            "failed to remove socket file"
        );
    }
}
