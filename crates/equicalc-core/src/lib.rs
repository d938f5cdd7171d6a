//! # Equicalc Core
//!
//! Asynchronous orchestration of the remote calculations:
//!
//! - [`RequestController`] - versioned single-slot requests; latest issue wins
//! - [`PipelineStage`] - controller plus pure request derivation
//! - [`CalculationPipeline`] - monthly projection → opportunity cost → startup
//!   scenario, driven by a single owner task
//! - [`SimulationSession`] - streamed Monte Carlo runs over a WebSocket
//!
//! # Example
//!
//! ```no_run
//! use equicalc_client::{ClientConfig, HttpCalculationService};
//! use equicalc_core::CalculationPipeline;
//! use equicalc_types::CalculationInput;
//! use std::sync::Arc;
//!
//! # async fn demo(input: CalculationInput) -> Result<(), Box<dyn std::error::Error>> {
//! let service = HttpCalculationService::new(&ClientConfig::default())?;
//! let pipeline = CalculationPipeline::spawn(Arc::new(service));
//! pipeline.set_input(input);
//! let state = pipeline.settled().await;
//! if let Some(result) = state.result {
//!     println!("net outcome: {:.2}", result.net_outcome());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod controller;
pub mod derive;
pub mod error;
pub mod operations;
pub mod pipeline;
pub mod simulation;
pub mod stage;

pub use controller::{
    Operation, RequestController, RequestHandle, RequestVersion, Settlement, StageState,
    StageStatus,
};
pub use derive::{
    derive_opportunity_cost_request, derive_projection_request, derive_startup_scenario_request,
};
pub use error::{RequestError, SimulationError, TransportError};
pub use operations::{MonthlyProjectionOp, OpportunityCostOp, StartupScenarioOp};
pub use pipeline::{CalculationPipeline, PipelineState};
pub use simulation::{
    MemoryPeer, MemoryServer, MemoryTransport, RunId, SimulationConnection, SimulationSession,
    SimulationState, SimulationStatus, SimulationTransport, WsTransport,
};
pub use stage::{Derivation, PipelineStage, StageSummary};
