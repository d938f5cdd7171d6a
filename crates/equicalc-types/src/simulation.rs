//! Simulation configuration and streamed frames
//!
//! A session sends exactly one [`SimulationConfig`] and then reads
//! [`SimulationFrame`]s: zero or more `progress` frames followed by one
//! `complete` or `error` frame.

use crate::error::{IssueReason, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sampling method run by the simulation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMethod {
    /// Random sampling of every distribution
    #[default]
    MonteCarlo,
    /// One variable at a time across its range
    SensitivityAnalysis,
}

/// Probability distribution of one uncertain parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionKind {
    /// Gaussian
    Normal { mean: f64, std_dev: f64 },
    /// Log-normal, parameters of the underlying normal
    #[serde(rename = "lognormal")]
    LogNormal { mean: f64, std_dev: f64 },
    /// Flat between two bounds
    Uniform { min: f64, max: f64 },
    /// Triangular with a most likely value
    Triangular { min: f64, mode: f64, max: f64 },
}

/// A named uncertain parameter (`exit_valuation`, `dilution`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Parameter the samples replace
    pub name: String,
    /// Its distribution
    pub distribution: DistributionKind,
}

impl Distribution {
    /// Create a named distribution
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, distribution: DistributionKind) -> Self {
        Self {
            name: name.into(),
            distribution,
        }
    }

    fn check(&self, v: &mut Validator, idx: usize) {
        let field = |name: &str| format!("distributions[{idx}].{name}");

        v.check(!self.name.trim().is_empty(), field("name"), IssueReason::Empty);
        match self.distribution {
            DistributionKind::Normal { mean, std_dev }
            | DistributionKind::LogNormal { mean, std_dev } => {
                v.check(mean.is_finite(), field("mean"), IssueReason::NotFinite);
                v.non_negative(&field("std_dev"), std_dev);
            }
            DistributionKind::Uniform { min, max } => {
                v.check(
                    min.is_finite() && max.is_finite() && min <= max,
                    field("max"),
                    IssueReason::Inconsistent("must not be below min".into()),
                );
            }
            DistributionKind::Triangular { min, mode, max } => {
                v.check(
                    min.is_finite() && mode.is_finite() && max.is_finite(),
                    field("mode"),
                    IssueReason::NotFinite,
                );
                v.check(
                    min <= mode && mode <= max,
                    field("mode"),
                    IssueReason::Inconsistent("must lie between min and max".into()),
                );
            }
        }
    }
}

/// The single configuration frame that starts a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Sampling method
    #[serde(default)]
    pub method: SimulationMethod,
    /// Uncertain parameters
    pub distributions: Vec<Distribution>,
    /// Total number of simulated scenarios
    pub n_simulations: u64,
    /// Scenarios per progress frame
    pub batch_size: u64,
}

impl SimulationConfig {
    /// Create a Monte Carlo configuration
    #[must_use]
    pub fn monte_carlo(distributions: Vec<Distribution>, n_simulations: u64, batch_size: u64) -> Self {
        Self {
            method: SimulationMethod::MonteCarlo,
            distributions,
            n_simulations,
            batch_size,
        }
    }

    /// Validate before anything is sent
    ///
    /// # Errors
    /// Returns every violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();

        v.check(self.n_simulations > 0, "n_simulations", IssueReason::NotPositive);
        v.check(self.batch_size > 0, "batch_size", IssueReason::NotPositive);
        v.check(
            self.batch_size <= self.n_simulations,
            "batch_size",
            IssueReason::Inconsistent("must not exceed n_simulations".into()),
        );
        v.check(!self.distributions.is_empty(), "distributions", IssueReason::Empty);

        let mut seen = HashSet::new();
        for (idx, dist) in self.distributions.iter().enumerate() {
            dist.check(&mut v, idx);
            if !seen.insert(dist.name.as_str()) {
                v.push(format!("distributions[{idx}].name"), IssueReason::Duplicate);
            }
        }

        v.finish()
    }

    /// Number of progress frames a well-behaved server sends
    #[inline]
    #[must_use]
    pub fn expected_batches(&self) -> u64 {
        if self.batch_size == 0 {
            return 0;
        }
        self.n_simulations.div_ceil(self.batch_size)
    }
}

/// Progress of a running simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Scenarios simulated so far
    pub current: u64,
    /// Scenarios requested
    pub total: u64,
    /// Completion in percent, 0..=100
    pub percentage: f64,
}

impl ProgressUpdate {
    /// Whether the frame is internally consistent
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.current <= self.total
            && self.percentage.is_finite()
            && (0.0..=100.0).contains(&self.percentage)
    }
}

/// Payload of the `complete` frame
///
/// The service decides which series it returns, so the payload is kept as
/// an open JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl SimulationResult {
    /// Numeric series stored under `key`, if present
    #[must_use]
    pub fn series(&self, key: &str) -> Option<Vec<f64>> {
        self.payload
            .get(key)?
            .as_array()?
            .iter()
            .map(serde_json::Value::as_f64)
            .collect()
    }

    /// Scalar stored under `key`, if present
    #[must_use]
    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(serde_json::Value::as_f64)
    }
}

/// One frame received from the simulation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationFrame {
    /// Intermediate progress
    Progress(ProgressUpdate),
    /// Final result; terminal
    Complete(SimulationResult),
    /// Server-side failure; terminal
    Error {
        /// Message reported by the server
        message: String,
    },
}

impl SimulationFrame {
    /// Decode a text frame
    ///
    /// # Errors
    /// Returns the decoder error for anything that is not a known frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether the frame ends the run
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}
