//! Request and response bodies of the remote calculation service
//!
//! The three operations are chained: the rows returned by one are forwarded
//! verbatim into the next. Rows are opaque to this workspace.

use crate::input::{
    DilutionRound, EquityDetails, EquityType, ExerciseStrategy, InvestmentFrequency,
    ValidatedInput,
};
use serde::{Deserialize, Serialize};

/// One row of a tabular result, forwarded without interpretation
pub type DataRow = serde_json::Map<String, serde_json::Value>;

/// Body of the monthly projection operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProjectionRequest {
    pub exit_year: u32,
    pub current_job_monthly_salary: f64,
    pub startup_monthly_salary: f64,
    pub current_job_salary_growth_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilution_rounds: Option<Vec<DilutionRound>>,
}

impl MonthlyProjectionRequest {
    /// Build from a validated snapshot
    #[must_use]
    pub fn from_input(input: &ValidatedInput<'_>) -> Self {
        Self {
            exit_year: input.global.exit_year,
            current_job_monthly_salary: input.job.monthly_salary,
            startup_monthly_salary: input.equity.monthly_salary(),
            current_job_salary_growth_rate: input.job.annual_salary_growth_rate,
            dilution_rounds: input.equity.simulated_dilution_rounds().map(<[_]>::to_vec),
        }
    }
}

/// Month-by-month salary comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProjection {
    pub data: Vec<DataRow>,
}

/// Option terms forwarded to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsParams {
    pub num_options: u64,
    pub strike_price: f64,
    pub target_exit_price_per_share: f64,
    pub exercise_strategy: ExerciseStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_year: Option<u32>,
}

/// RSU terms forwarded to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsuParams {
    pub equity_pct: f64,
    pub target_exit_valuation: f64,
    pub simulate_dilution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilution_rounds: Option<Vec<DilutionRound>>,
}

/// Everything the service needs to know about the startup offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupParams {
    pub equity_type: EquityType,
    pub total_vesting_years: u32,
    pub cliff_period_years: u32,
    pub exit_year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsu_params: Option<RsuParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_params: Option<OptionsParams>,
}

impl StartupParams {
    /// Build from a validated snapshot
    #[must_use]
    pub fn from_input(input: &ValidatedInput<'_>) -> Self {
        let vesting = input.equity.vesting();
        let (rsu_params, options_params) = match input.equity {
            EquityDetails::Rsu(rsu) => (
                Some(RsuParams {
                    equity_pct: rsu.equity_pct,
                    target_exit_valuation: rsu.target_exit_valuation,
                    simulate_dilution: rsu.simulate_dilution,
                    dilution_rounds: input.equity.simulated_dilution_rounds().map(<[_]>::to_vec),
                }),
                None,
            ),
            EquityDetails::StockOptions(_) => (None, OptionsParams::from_input(input)),
        };

        Self {
            equity_type: input.equity.equity_type(),
            total_vesting_years: vesting.total_vesting_years,
            cliff_period_years: vesting.cliff_years,
            exit_year: input.global.exit_year,
            rsu_params,
            options_params,
        }
    }
}

impl OptionsParams {
    /// Option terms, or `None` for an RSU grant
    #[must_use]
    pub fn from_input(input: &ValidatedInput<'_>) -> Option<Self> {
        match input.equity {
            EquityDetails::StockOptions(options) => Some(Self {
                num_options: options.num_options,
                strike_price: options.strike_price,
                target_exit_price_per_share: options.target_exit_price_per_share,
                exercise_strategy: options.exercise_strategy,
                exercise_year: options.exercise_year,
            }),
            EquityDetails::Rsu(_) => None,
        }
    }
}

/// Body of the opportunity cost operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCostRequest {
    pub monthly_data: Vec<DataRow>,
    pub annual_roi: f64,
    pub investment_frequency: InvestmentFrequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_params: Option<OptionsParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_params: Option<StartupParams>,
}

/// Accumulated opportunity cost per month
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCost {
    pub data: Vec<DataRow>,
}

/// Body of the startup scenario operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupScenarioRequest {
    pub opportunity_cost_data: Vec<DataRow>,
    pub startup_params: StartupParams,
}

/// Final comparison between staying and joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupScenario {
    pub results_df: Vec<DataRow>,
    pub final_payout_value: f64,
    pub final_opportunity_cost: f64,
    pub payout_label: String,
    pub breakeven_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_dilution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diluted_equity_pct: Option<f64>,
}

impl StartupScenario {
    /// Payout minus opportunity cost
    #[inline]
    #[must_use]
    pub fn net_outcome(&self) -> f64 {
        self.final_payout_value - self.final_opportunity_cost
    }
}
