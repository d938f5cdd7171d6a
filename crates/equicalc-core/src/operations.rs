//! The three remote calculations as [`Operation`]s

use crate::controller::Operation;
use async_trait::async_trait;
use equicalc_client::{CalculationService, ServiceError};
use equicalc_types::{
    MonthlyProjection, MonthlyProjectionRequest, OpportunityCost, OpportunityCostRequest,
    StartupScenario, StartupScenarioRequest,
};
use std::sync::Arc;

/// Stage 1: monthly salary projection
#[derive(Clone)]
pub struct MonthlyProjectionOp {
    service: Arc<dyn CalculationService>,
}

impl MonthlyProjectionOp {
    /// Wrap the calculation service
    pub fn new(service: Arc<dyn CalculationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Operation for MonthlyProjectionOp {
    type Input = MonthlyProjectionRequest;
    type Output = MonthlyProjection;
    const NAME: &'static str = "monthly_projection";

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ServiceError> {
        self.service.monthly_projection(input).await
    }
}

/// Stage 2: opportunity cost
#[derive(Clone)]
pub struct OpportunityCostOp {
    service: Arc<dyn CalculationService>,
}

impl OpportunityCostOp {
    /// Wrap the calculation service
    pub fn new(service: Arc<dyn CalculationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Operation for OpportunityCostOp {
    type Input = OpportunityCostRequest;
    type Output = OpportunityCost;
    const NAME: &'static str = "opportunity_cost";

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ServiceError> {
        self.service.opportunity_cost(input).await
    }
}

/// Stage 3: startup scenario
#[derive(Clone)]
pub struct StartupScenarioOp {
    service: Arc<dyn CalculationService>,
}

impl StartupScenarioOp {
    /// Wrap the calculation service
    pub fn new(service: Arc<dyn CalculationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Operation for StartupScenarioOp {
    type Input = StartupScenarioRequest;
    type Output = StartupScenario;
    const NAME: &'static str = "startup_scenario";

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ServiceError> {
        self.service.startup_scenario(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_client::ErrorCode;
    use equicalc_types::{EquityType, StartupParams};
    use mockall::predicate::eq;

    mockall::mock! {
        Service {}

        #[async_trait]
        impl CalculationService for Service {
            async fn monthly_projection(
                &self,
                request: MonthlyProjectionRequest,
            ) -> Result<MonthlyProjection, ServiceError>;
            async fn opportunity_cost(
                &self,
                request: OpportunityCostRequest,
            ) -> Result<OpportunityCost, ServiceError>;
            async fn startup_scenario(
                &self,
                request: StartupScenarioRequest,
            ) -> Result<StartupScenario, ServiceError>;
        }
    }

    fn projection_request() -> MonthlyProjectionRequest {
        MonthlyProjectionRequest {
            exit_year: 5,
            current_job_monthly_salary: 8_000.0,
            startup_monthly_salary: 10_000.0,
            current_job_salary_growth_rate: 0.03,
            dilution_rounds: None,
        }
    }

    #[tokio::test]
    async fn projection_op_forwards_to_service() {
        let mut service = MockService::new();
        service
            .expect_monthly_projection()
            .with(eq(projection_request()))
            .times(1)
            .returning(|_| Ok(MonthlyProjection::default()));

        let op = MonthlyProjectionOp::new(Arc::new(service));
        let output = op.execute(projection_request()).await.unwrap();
        assert!(output.data.is_empty());
    }

    #[tokio::test]
    async fn scenario_op_propagates_service_failure() {
        let mut service = MockService::new();
        service
            .expect_startup_scenario()
            .times(1)
            .returning(|_| Err(ServiceError::service(ErrorCode::NotFound, "gone")));
        service.expect_monthly_projection().never();

        let op = StartupScenarioOp::new(Arc::new(service));
        let err = op
            .execute(StartupScenarioRequest {
                opportunity_cost_data: Vec::new(),
                startup_params: StartupParams {
                    equity_type: EquityType::Rsu,
                    total_vesting_years: 4,
                    cliff_period_years: 1,
                    exit_year: 5,
                    rsu_params: None,
                    options_params: None,
                },
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn cost_op_forwards_to_service() {
        let mut service = MockService::new();
        service
            .expect_opportunity_cost()
            .times(1)
            .returning(|request| {
                Ok(OpportunityCost {
                    data: request.monthly_data,
                })
            });

        let op = OpportunityCostOp::new(Arc::new(service));
        let output = op
            .execute(OpportunityCostRequest {
                monthly_data: Vec::new(),
                annual_roi: 0.05,
                investment_frequency: equicalc_types::InvestmentFrequency::Annually,
                options_params: None,
                startup_params: None,
            })
            .await
            .unwrap();
        assert!(output.data.is_empty());
    }
}
