//! Client side of a bridge connection.
//!
//! A [`Client`] owns one connection and lets any number of threads issue
//! calls over it at once. Each call is tagged with a fresh sequence number
//! and parked in a pending table; a background reader thread routes every
//! response line to the call waiting for it. When the connection ends, all
//! parked calls fail with [`TransportError::ConnectionClosed`]. A response
//! line that cannot be parsed fails the call it names with
//! [`TransportError::Malformed`], or every parked call when no sequence
//! number can be read from it.

use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use tether_config::{
    Config, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_ENVELOPE_BYTES, SocketEndpoint,
};

use crate::codec::{decode_line, encode_line, read_line};
use crate::error::{ProvisionerError, TransportError};
use crate::protocol::{CallEnvelope, Method, ResponseBody, ResponseEnvelope, recover_seq};
use crate::transport::{self, ConnectionStream};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Tunables for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long a call waits for its response.
    pub call_timeout: Duration,
    /// Largest envelope sent or accepted, in bytes.
    pub max_envelope_bytes: usize,
}

impl ClientOptions {
    /// Takes the options from loaded configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            max_envelope_bytes: config.max_envelope_bytes(),
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
        }
    }
}

/// Handle to a bridge connection. Clones share the connection.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    writer: Mutex<ConnectionStream>,
    control: ConnectionStream,
    pending: Arc<Pending>,
    next_seq: AtomicU64,
    options: ClientOptions,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.pending.close();
        if let Err(error) = self.control.shutdown() {
            debug!(target: CLIENT_TARGET, error = %error, "failed to close connection");
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    state: Mutex<PendingState>,
}

type Outcome = Result<ResponseBody, TransportError>;

#[derive(Debug, Default)]
struct PendingState {
    closed: bool,
    waiters: HashMap<u64, Sender<Outcome>>,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, seq: u64) -> Result<Receiver<Outcome>, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::ConnectionClosed);
        }
        let (sender, receiver) = mpsc::channel();
        state.waiters.insert(seq, sender);
        Ok(receiver)
    }

    fn abandon(&self, seq: u64) {
        self.lock().waiters.remove(&seq);
    }

    fn complete(&self, seq: u64, outcome: Outcome) {
        let Some(waiter) = self.lock().waiters.remove(&seq) else {
            debug!(target: CLIENT_TARGET, seq, "dropping response with no waiting call");
            return;
        };
        if waiter.send(outcome).is_err() {
            debug!(target: CLIENT_TARGET, seq, "call gave up before its response arrived");
        }
    }

    /// Fails every parked call with `error`. The connection stays usable.
    fn fail_all(&self, error: &TransportError) {
        let waiters: Vec<_> = self.lock().waiters.drain().collect();
        for (seq, waiter) in waiters {
            if waiter.send(Err(error.clone())).is_err() {
                debug!(target: CLIENT_TARGET, seq, "call gave up before it could be failed");
            }
        }
    }

    /// Dropping the senders wakes every waiting call.
    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiters.clear();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Client {
    /// Wraps a connected stream and starts reading responses from it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the stream handle cannot be
    /// duplicated or the reader thread cannot be started.
    pub fn new(stream: ConnectionStream, options: ClientOptions) -> Result<Self, TransportError> {
        let reader = stream.try_clone().map_err(TransportError::io)?;
        let control = stream.try_clone().map_err(TransportError::io)?;
        let pending = Arc::new(Pending::default());
        {
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name(String::from("tether-client-reader"))
                .spawn(move || read_responses(reader, &pending, options.max_envelope_bytes))
                .map_err(TransportError::io)?;
        }
        Ok(Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(stream),
                control,
                pending,
                next_seq: AtomicU64::new(0),
                options,
            }),
        })
    }

    /// Connects to a server listening on `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when the connection cannot be opened.
    pub fn connect(
        endpoint: &SocketEndpoint,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        let stream = transport::connect(endpoint).map_err(TransportError::io)?;
        debug!(target: CLIENT_TARGET, endpoint = %endpoint, "connected");
        Self::new(stream, options)
    }

    /// Returns the options the client was created with.
    #[must_use]
    pub fn options(&self) -> ClientOptions {
        self.inner.options
    }

    /// Sends one call and blocks until its response arrives.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the envelope cannot be sent, the
    /// connection closes first, the response cannot be parsed, or no response
    /// arrives within the configured timeout. A parsed response body is
    /// returned as-is, faults included.
    pub fn call(
        &self,
        target: &str,
        method: Method,
        arguments: serde_json::Value,
    ) -> Result<ResponseBody, ProvisionerError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let line = encode_line(&CallEnvelope::new(seq, target, method, arguments))?;
        let max_size = self.inner.options.max_envelope_bytes;
        if line.len() > max_size {
            return Err(TransportError::EnvelopeTooLarge {
                size: line.len(),
                max_size,
            }
            .into());
        }

        let receiver = self.inner.pending.park(seq)?;
        if let Err(error) = self.send(&line) {
            self.inner.pending.abandon(seq);
            return Err(error.into());
        }
        debug!(target: CLIENT_TARGET, seq, provisioner = target, %method, "call sent");

        let timeout = self.inner.options.call_timeout;
        match receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome.map_err(ProvisionerError::from),
            Err(RecvTimeoutError::Timeout) => {
                self.inner.pending.abandon(seq);
                warn!(
                    target: CLIENT_TARGET,
                    seq,
                    provisioner = target,
                    %method,
                    "call timed out"
                );
                Err(TransportError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ConnectionClosed.into()),
        }
    }

    /// Closes the connection. Calls in flight on any clone fail with
    /// [`TransportError::ConnectionClosed`], as do all later calls.
    pub fn close(&self) {
        self.inner.pending.close();
        if let Err(error) = self.inner.control.shutdown() {
            debug!(target: CLIENT_TARGET, error = %error, "shutdown after close failed");
        }
    }

    /// Returns `true` once the connection has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.pending.is_closed()
    }

    fn send(&self, line: &[u8]) -> Result<(), TransportError> {
        let mut writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line).map_err(TransportError::io)?;
        writer.flush().map_err(TransportError::io)
    }
}

fn read_responses(stream: ConnectionStream, pending: &Pending, max_bytes: usize) {
    let mut reader = BufReader::new(stream);
    loop {
        let line = match read_line(&mut reader, max_bytes) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(target: CLIENT_TARGET, error = %error, "connection failed");
                break;
            }
        };
        if line.trim_ascii().is_empty() {
            continue;
        }
        match decode_line::<ResponseEnvelope>(&line) {
            Ok(response) => {
                let seq = response.seq();
                pending.complete(seq, Ok(response.into_body()));
            }
            Err(error) => {
                let malformed = TransportError::Malformed {
                    message: error.to_string(),
                };
                if let Some(seq) = recover_seq(&line) {
                    warn!(
                        target: CLIENT_TARGET,
                        seq,
                        error = %error,
                        "malformed response envelope"
                    );
                    pending.complete(seq, Err(malformed));
                } else {
                    warn!(
                        target: CLIENT_TARGET,
                        error = %error,
                        "unattributable response envelope, failing all pending calls"
                    );
                    pending.fail_all(&malformed);
                }
            }
        }
    }
    debug!(target: CLIENT_TARGET, "connection ended");
    pending.close();
}
