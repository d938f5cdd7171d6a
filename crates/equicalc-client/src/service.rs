//! The calculation service seam
//!
//! Orchestration code depends on [`CalculationService`] only, so the HTTP
//! adapter can be swapped for an in-process fake in tests.

use crate::error::ServiceError;
use async_trait::async_trait;
use equicalc_types::{
    MonthlyProjection, MonthlyProjectionRequest, OpportunityCost, OpportunityCostRequest,
    StartupScenario, StartupScenarioRequest,
};
use std::fmt;

/// Remote operation exposed by the calculation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Month-by-month salary comparison
    MonthlyProjection,
    /// Invested salary difference over time
    OpportunityCost,
    /// Equity payout versus opportunity cost
    StartupScenario,
}

impl Endpoint {
    /// URL path, relative to the API base
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::MonthlyProjection => "/api/monthly-data",
            Self::OpportunityCost => "/api/opportunity-cost",
            Self::StartupScenario => "/api/startup-scenario",
        }
    }

    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MonthlyProjection => "monthly_projection",
            Self::OpportunityCost => "opportunity_cost",
            Self::StartupScenario => "startup_scenario",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client of the remote calculation service
///
/// Every call either returns the decoded body or a classified
/// [`ServiceError`]. Implementations must be cancel-safe: dropping the
/// returned future abandons the call.
#[async_trait]
pub trait CalculationService: Send + Sync {
    /// Monthly salary projection
    async fn monthly_projection(
        &self,
        request: MonthlyProjectionRequest,
    ) -> Result<MonthlyProjection, ServiceError>;

    /// Opportunity cost of the forgone salary
    async fn opportunity_cost(
        &self,
        request: OpportunityCostRequest,
    ) -> Result<OpportunityCost, ServiceError>;

    /// Final startup scenario
    async fn startup_scenario(
        &self,
        request: StartupScenarioRequest,
    ) -> Result<StartupScenario, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_map_to_api_paths() {
        assert_eq!(Endpoint::MonthlyProjection.path(), "/api/monthly-data");
        assert_eq!(Endpoint::OpportunityCost.path(), "/api/opportunity-cost");
        assert_eq!(Endpoint::StartupScenario.path(), "/api/startup-scenario");
        assert_eq!(Endpoint::StartupScenario.to_string(), "startup_scenario");
    }
}
