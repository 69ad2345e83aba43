//! Byte streams and socket listeners carrying bridge connections.
//!
//! [`listen`] binds a [`SocketEndpoint`](tether_config::SocketEndpoint) and
//! hands every accepted [`ConnectionStream`] to a [`ConnectionHandler`] on its
//! own thread. Clients open the same kind of stream with [`connect`].

mod errors;
mod listener;
mod stream;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, listen};
pub use self::stream::{ConnectionHandler, ConnectionStream, connect};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
