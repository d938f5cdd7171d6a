//! Equicalc Types - shared data model
//!
//! Everything that crosses a boundary lives here:
//! - Input snapshots produced by the forms, with local validation
//! - Request/response bodies of the three chained calculation operations
//! - Simulation configuration and streamed frames
//!
//! # Example
//!
//! ```rust
//! use equicalc_types::{CalculationInput, GlobalSettings};
//!
//! let input = CalculationInput::new().with_global_settings(GlobalSettings { exit_year: 5 });
//! let err = input.validate().unwrap_err();
//! assert!(err.has_issue("current_job"));
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod input;
pub mod simulation;
pub mod wire;

pub use error::{FieldIssue, IssueReason, ValidationError};
pub use input::{
    CalculationInput, CurrentJob, DilutionRound, EquityDetails, EquityType, ExerciseStrategy,
    GlobalSettings, InvestmentFrequency, RoundType, RsuDetails, StockOptionDetails,
    ValidatedInput, VestingSchedule, MAX_EXIT_YEAR,
};
pub use simulation::{
    Distribution, DistributionKind, ProgressUpdate, SimulationConfig, SimulationFrame,
    SimulationMethod, SimulationResult,
};
pub use wire::{
    DataRow, MonthlyProjection, MonthlyProjectionRequest, OpportunityCost,
    OpportunityCostRequest, OptionsParams, RsuParams, StartupParams, StartupScenario,
    StartupScenarioRequest,
};
