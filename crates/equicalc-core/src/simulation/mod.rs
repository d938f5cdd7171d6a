//! Streaming simulation session
//!
//! - [`SimulationSession`] - one run at a time over a [`SimulationTransport`]
//! - [`WsTransport`] - WebSocket transport (tokio-tungstenite)
//! - [`MemoryTransport`] - in-process transport for tests and demos

mod memory;
mod session;
mod transport;
mod ws;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use session::{RunId, SimulationSession, SimulationState, SimulationStatus};
pub use transport::{SimulationConnection, SimulationTransport};
pub use ws::WsTransport;
