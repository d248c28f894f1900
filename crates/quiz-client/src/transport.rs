//! Transport abstraction for the quiz server connection.
//!
//! Decouples the connection manager from any specific socket. The
//! supervisor in [`crate::connection`] only ever sees a [`Connector`]
//! it can redial and the read/write halves of whatever that produces,
//! which is what lets the reconnect loop be tested against in-memory
//! channels.

use std::future::Future;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O or protocol-level error.
    #[error("{0}")]
    Io(String),
}

/// Read half of a transport connection.
pub trait TransportReader: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

/// Write half of a transport connection.
pub trait TransportWriter: Send + 'static {
    /// Send a text frame to the remote peer.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A bidirectional transport that splits into independent read and
/// write halves, so the two directions can be driven concurrently.
pub trait Transport: Send + 'static {
    /// The read half produced by [`split`](Transport::split).
    type Reader: TransportReader;
    /// The write half produced by [`split`](Transport::split).
    type Writer: TransportWriter;

    /// Split the transport into independent read and write halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Factory the connection manager uses to dial (and redial) the server.
///
/// Takes `&mut self` so scripted test connectors can pop pre-built
/// transports without interior mutability.
pub trait Connector: Send + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Open a fresh connection to the server.
    fn connect(
        &mut self,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
