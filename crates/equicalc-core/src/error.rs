//! Error types for Equicalc Core
//!
//! Provides error handling for:
//! - Request attempts (service failure or cancellation)
//! - Simulation sessions (connection, server, protocol, validation)
//! - Simulation transports

use equicalc_client::{ErrorKind, ServiceError};
use equicalc_types::ValidationError;

/// Outcome of a request attempt that produced no data
///
/// `Cancelled` never reaches public state; it only tells the controller
/// that the attempt was abandoned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// Network or service failure
    #[error(transparent)]
    Failed(#[from] ServiceError),

    /// Attempt abandoned before completion
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Check if this is a cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure of a simulation run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// Configuration rejected before anything was sent
    #[error("invalid simulation config: {0}")]
    Validation(#[from] ValidationError),

    /// Connection could not be opened or closed unexpectedly
    #[error("simulation connection failed: {0}")]
    Connection(String),

    /// Server reported a failure
    #[error("simulation failed: {0}")]
    Server(String),

    /// Server sent something the client cannot accept
    #[error("simulation protocol violation: {0}")]
    Protocol(String),
}

impl SimulationError {
    /// Display classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Connection(_) => ErrorKind::Network,
            Self::Server(_) => ErrorKind::Calculation,
            Self::Protocol(_) => ErrorKind::Internal,
        }
    }
}

/// Failure inside a simulation transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be opened
    #[error("connect failed: {0}")]
    Connect(String),

    /// Outgoing frame not delivered
    #[error("send failed: {0}")]
    Send(String),

    /// Connection broke while reading
    #[error("receive failed: {0}")]
    Receive(String),

    /// Frame arrived but is not valid text
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Used after `close`
    #[error("connection already closed")]
    Closed,
}

impl From<TransportError> for SimulationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidFrame(_) => {
                Self::Protocol("malformed frame from simulation service".into())
            }
            other => Self::Connection(other.to_string()),
        }
    }
}
