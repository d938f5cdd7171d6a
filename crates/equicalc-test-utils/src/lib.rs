//! Testing utilities for the equicalc workspace
//!
//! Shared fixtures and an in-process calculation service.

#![allow(missing_docs)]

use async_trait::async_trait;
use equicalc_client::{CalculationService, Endpoint, ServiceError};
use equicalc_types::{
    CalculationInput, CurrentJob, DataRow, Distribution, DistributionKind, EquityDetails,
    ExerciseStrategy, GlobalSettings, InvestmentFrequency, MonthlyProjection,
    MonthlyProjectionRequest, OpportunityCost, OpportunityCostRequest, RsuDetails,
    SimulationConfig, StartupParams, StartupScenario, StartupScenarioRequest, StockOptionDetails,
    VestingSchedule,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

// =============================================================================
// FIXTURES
// =============================================================================

pub fn current_job() -> CurrentJob {
    CurrentJob {
        monthly_salary: 8_000.0,
        annual_salary_growth_rate: 0.03,
        assumed_annual_roi: 0.054,
        investment_frequency: InvestmentFrequency::Monthly,
    }
}

pub fn vesting() -> VestingSchedule {
    VestingSchedule {
        total_vesting_years: 4,
        cliff_years: 1,
    }
}

pub fn rsu_details(startup_salary: f64) -> EquityDetails {
    EquityDetails::Rsu(RsuDetails {
        monthly_salary: startup_salary,
        vesting: vesting(),
        equity_pct: 0.5,
        target_exit_valuation: 100_000_000.0,
        simulate_dilution: false,
        dilution_rounds: Vec::new(),
    })
}

pub fn option_details(startup_salary: f64) -> EquityDetails {
    EquityDetails::StockOptions(StockOptionDetails {
        monthly_salary: startup_salary,
        vesting: vesting(),
        num_options: 40_000,
        strike_price: 0.75,
        target_exit_price_per_share: 12.0,
        exercise_strategy: ExerciseStrategy::AtExit,
        exercise_year: None,
    })
}

/// Complete RSU snapshot: exit year 5, current salary 8000
pub fn rsu_input(startup_salary: f64) -> CalculationInput {
    CalculationInput::new()
        .with_global_settings(GlobalSettings { exit_year: 5 })
        .with_current_job(current_job())
        .with_equity_details(rsu_details(startup_salary))
}

/// Complete stock option snapshot: exit year 5, current salary 8000
pub fn options_input(startup_salary: f64) -> CalculationInput {
    CalculationInput::new()
        .with_global_settings(GlobalSettings { exit_year: 5 })
        .with_current_job(current_job())
        .with_equity_details(option_details(startup_salary))
}

pub fn sample_input() -> CalculationInput {
    rsu_input(10_000.0)
}

pub fn simulation_config() -> SimulationConfig {
    SimulationConfig::monte_carlo(
        vec![Distribution::new(
            "exit_valuation",
            DistributionKind::Normal {
                mean: 100_000_000.0,
                std_dev: 20_000_000.0,
            },
        )],
        1_000,
        250,
    )
}

pub fn row(value: serde_json::Value) -> DataRow {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

// =============================================================================
// FAKE CALCULATION SERVICE
// =============================================================================

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MonthlyProjection(MonthlyProjectionRequest),
    OpportunityCost(OpportunityCostRequest),
    StartupScenario(StartupScenarioRequest),
}

impl Call {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::MonthlyProjection(_) => Endpoint::MonthlyProjection,
            Self::OpportunityCost(_) => Endpoint::OpportunityCost,
            Self::StartupScenario(_) => Endpoint::StartupScenario,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<Call>,
    completed: HashMap<Endpoint, usize>,
    delays: HashMap<Endpoint, VecDeque<Duration>>,
    default_delay: HashMap<Endpoint, Duration>,
    failures: HashMap<Endpoint, VecDeque<ServiceError>>,
    empty: HashMap<Endpoint, usize>,
}

/// Deterministic in-process calculation service
///
/// Responses echo the request so tests can tell which input produced a
/// result: every row carries `StartupSalary`, forwarded down the chain.
#[derive(Debug, Default)]
pub struct FakeCalculationService {
    state: Mutex<FakeState>,
}

impl FakeCalculationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every call of `endpoint` without a queued delay
    pub fn set_delay(&self, endpoint: Endpoint, delay: Duration) {
        self.state.lock().default_delay.insert(endpoint, delay);
    }

    /// Delay for the next call of `endpoint` only
    pub fn push_delay(&self, endpoint: Endpoint, delay: Duration) {
        self.state
            .lock()
            .delays
            .entry(endpoint)
            .or_default()
            .push_back(delay);
    }

    /// Fail the next call of `endpoint`
    pub fn fail_next(&self, endpoint: Endpoint, error: ServiceError) {
        self.state
            .lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Answer the next call of `endpoint` with no rows
    pub fn return_empty_next(&self, endpoint: Endpoint) {
        *self.state.lock().empty.entry(endpoint).or_default() += 1;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls issued to `endpoint`, including abandoned ones
    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Calls of `endpoint` that ran to completion
    pub fn completed_count(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .completed
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Record the call and apply scripted behavior; `Ok(true)` means answer
    /// with no rows
    async fn begin(&self, call: Call) -> Result<bool, ServiceError> {
        let endpoint = call.endpoint();
        let (delay, failure, empty) = {
            let mut state = self.state.lock();
            state.calls.push(call);
            let delay = state
                .delays
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.default_delay.get(&endpoint).copied())
                .unwrap_or(Duration::ZERO);
            let failure = state
                .failures
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front);
            let empty = match state.empty.get_mut(&endpoint) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    true
                }
                _ => false,
            };
            (delay, failure, empty)
        };

        tokio::time::sleep(delay).await;
        *self.state.lock().completed.entry(endpoint).or_default() += 1;

        match failure {
            Some(err) => Err(err),
            None => Ok(empty),
        }
    }
}

fn startup_salary_of(rows: &[DataRow]) -> serde_json::Value {
    rows.first()
        .and_then(|r| r.get("StartupSalary"))
        .cloned()
        .unwrap_or(serde_json::Value::Null)
}

fn payout(params: &StartupParams) -> f64 {
    if let Some(rsu) = &params.rsu_params {
        return rsu.equity_pct / 100.0 * rsu.target_exit_valuation;
    }
    params.options_params.as_ref().map_or(0.0, |o| {
        #[allow(clippy::cast_precision_loss)]
        let options = o.num_options as f64;
        options * (o.target_exit_price_per_share - o.strike_price).max(0.0)
    })
}

#[async_trait]
impl CalculationService for FakeCalculationService {
    async fn monthly_projection(
        &self,
        request: MonthlyProjectionRequest,
    ) -> Result<MonthlyProjection, ServiceError> {
        if self.begin(Call::MonthlyProjection(request.clone())).await? {
            return Ok(MonthlyProjection { data: Vec::new() });
        }

        let data = (1..=request.exit_year)
            .map(|year| {
                row(json!({
                    "Year": year,
                    "MonthlySalary": request.current_job_monthly_salary,
                    "StartupSalary": request.startup_monthly_salary,
                    "SalaryDifference":
                        request.current_job_monthly_salary - request.startup_monthly_salary,
                }))
            })
            .collect();
        Ok(MonthlyProjection { data })
    }

    async fn opportunity_cost(
        &self,
        request: OpportunityCostRequest,
    ) -> Result<OpportunityCost, ServiceError> {
        if self.begin(Call::OpportunityCost(request.clone())).await? {
            return Ok(OpportunityCost { data: Vec::new() });
        }

        let mut cumulative = 0.0;
        let data = request
            .monthly_data
            .iter()
            .map(|r| {
                let diff = r
                    .get("SalaryDifference")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                cumulative = (cumulative + diff * 12.0) * (1.0 + request.annual_roi);
                row(json!({
                    "Year": r.get("Year").cloned().unwrap_or(serde_json::Value::Null),
                    "StartupSalary": r.get("StartupSalary").cloned().unwrap_or(serde_json::Value::Null),
                    "Opportunity Cost (Invested)": cumulative,
                }))
            })
            .collect();
        Ok(OpportunityCost { data })
    }

    async fn startup_scenario(
        &self,
        request: StartupScenarioRequest,
    ) -> Result<StartupScenario, ServiceError> {
        let _ = self.begin(Call::StartupScenario(request.clone())).await?;

        let final_opportunity_cost = request
            .opportunity_cost_data
            .last()
            .and_then(|r| r.get("Opportunity Cost (Invested)"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        let startup_salary = startup_salary_of(&request.opportunity_cost_data);

        Ok(StartupScenario {
            results_df: request.opportunity_cost_data.clone(),
            final_payout_value: payout(&request.startup_params),
            final_opportunity_cost,
            payout_label: "Payout".to_string(),
            breakeven_label: format!("Startup salary {startup_salary}"),
            total_dilution: None,
            diluted_equity_pct: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_client::ErrorCode;

    #[tokio::test(start_paused = true)]
    async fn fake_chain_echoes_startup_salary() {
        let service = FakeCalculationService::new();
        let input = rsu_input(12_000.0);
        let validated = input.validate().unwrap();

        let projection = service
            .monthly_projection(MonthlyProjectionRequest::from_input(&validated))
            .await
            .unwrap();
        assert_eq!(projection.data.len(), 5);
        assert_eq!(projection.data[0]["StartupSalary"], json!(12_000.0));

        let cost = service
            .opportunity_cost(OpportunityCostRequest {
                monthly_data: projection.data,
                annual_roi: 0.054,
                investment_frequency: InvestmentFrequency::Monthly,
                options_params: None,
                startup_params: None,
            })
            .await
            .unwrap();
        assert_eq!(cost.data[0]["StartupSalary"], json!(12_000.0));
        assert_eq!(service.completed_count(Endpoint::OpportunityCost), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_failures_and_delays_apply_once() {
        let service = FakeCalculationService::new();
        service.fail_next(
            Endpoint::MonthlyProjection,
            ServiceError::service(ErrorCode::Internal, "boom"),
        );
        service.push_delay(Endpoint::MonthlyProjection, Duration::from_secs(5));

        let validated_input = sample_input();
        let validated = validated_input.validate().unwrap();
        let request = MonthlyProjectionRequest::from_input(&validated);

        let started = tokio::time::Instant::now();
        assert!(service.monthly_projection(request.clone()).await.is_err());
        assert!(started.elapsed() >= Duration::from_secs(5));

        assert!(service.monthly_projection(request).await.is_ok());
        assert_eq!(service.call_count(Endpoint::MonthlyProjection), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_answer_applies_once() {
        let service = FakeCalculationService::new();
        service.return_empty_next(Endpoint::MonthlyProjection);
        let input = sample_input();
        let request = MonthlyProjectionRequest::from_input(&input.validate().unwrap());

        let first = service.monthly_projection(request.clone()).await.unwrap();
        assert!(first.data.is_empty());
        let second = service.monthly_projection(request).await.unwrap();
        assert_eq!(second.data.len(), 5);
    }
}
