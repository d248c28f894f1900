//! In-memory transport plumbing for tests.
//!
//! [`mem_pair`] builds a channel-backed [`Transport`] plus the
//! server-side [`MemEndpoint`] a test uses to inject frames and observe
//! what the client wrote. [`ScriptConnector`] feeds the connection
//! supervisor a scripted sequence of dial outcomes.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::transport::{Connector, Transport, TransportError, TransportReader, TransportWriter};

/// Channel-backed transport handed to the client under test.
pub(crate) struct MemTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

/// The "server" side of a [`MemTransport`]. Dropping it closes the
/// link, which the client observes as a clean remote close.
pub(crate) struct MemEndpoint {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MemEndpoint {
    /// Inject one frame as if the server had sent it.
    pub fn push(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }
}

/// Build a connected transport/endpoint pair.
pub(crate) fn mem_pair() -> (MemTransport, MemEndpoint) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    (
        MemTransport { inbound, outbound },
        MemEndpoint { to_client, from_client },
    )
}

pub(crate) struct MemReader {
    inbound: mpsc::UnboundedReceiver<String>,
}

pub(crate) struct MemWriter {
    outbound: mpsc::UnboundedSender<String>,
}

impl Transport for MemTransport {
    type Reader = MemReader;
    type Writer = MemWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (MemReader { inbound: self.inbound }, MemWriter { outbound: self.outbound })
    }
}

impl TransportReader for MemReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        // Sender dropped = remote closed cleanly.
        Ok(self.inbound.recv().await)
    }
}

impl TransportWriter for MemWriter {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(text.to_string())
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Pops a scripted dial outcome per `connect()` call; once the script
/// is exhausted every further dial fails.
pub(crate) struct ScriptConnector {
    script: VecDeque<Result<MemTransport, TransportError>>,
}

impl ScriptConnector {
    pub fn new(script: Vec<Result<MemTransport, TransportError>>) -> Self {
        Self { script: script.into() }
    }

    /// A connector whose every dial fails.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }
}

impl Connector for ScriptConnector {
    type Transport = MemTransport;

    async fn connect(&mut self) -> Result<MemTransport, TransportError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Io("connection refused".to_string())))
    }
}
