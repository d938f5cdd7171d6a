//! Transport seam for the simulation service

use crate::error::TransportError;
use async_trait::async_trait;

/// Opens connections to the simulation service
#[async_trait]
pub trait SimulationTransport: Send + Sync {
    /// Open a new connection; resolves once it is ready to send
    async fn connect(&self) -> Result<Box<dyn SimulationConnection>, TransportError>;
}

/// One open, text-framed connection
#[async_trait]
pub trait SimulationConnection: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame; `None` once the peer closed the connection
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close from the client side; idempotent
    async fn close(&mut self) -> Result<(), TransportError>;
}
