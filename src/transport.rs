//! Outbound side of the persistent connection.
//!
//! The probe only needs to push a payload; framing and delivery belong to
//! whatever implements [`Transport`]. [`ChannelTransport`] hands lines to a
//! writer task over an unbounded channel so `send` never blocks.

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors raised when a payload cannot be handed to the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection (or its writer) is already gone.
    #[error("Transport is closed")]
    Closed,
}

/// Capability to transmit one message over an open connection.
pub trait Transport {
    /// Transmits `payload` as a single message.
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;
}

/// Transport that forwards payloads to a writer task.
pub struct ChannelTransport {
    tx: UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        ChannelTransport { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        self.tx
            .send(payload.to_owned())
            .map_err(|_| TransportError::Closed)
    }
}
