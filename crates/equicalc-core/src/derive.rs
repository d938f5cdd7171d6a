//! Request derivation for the three chained stages
//!
//! Pure functions of (upstream data, input snapshot). `None` means the data
//! needed to build the request is not there yet, and the stage is not issued.

use equicalc_types::{
    CalculationInput, EquityDetails, MonthlyProjection, MonthlyProjectionRequest,
    OpportunityCost, OpportunityCostRequest, OptionsParams, StartupParams,
    StartupScenarioRequest,
};

/// Stage 1: monthly projection, from input alone
#[must_use]
pub fn derive_projection_request(
    _upstream: &(),
    input: &CalculationInput,
) -> Option<MonthlyProjectionRequest> {
    let validated = input.validate().ok()?;
    Some(MonthlyProjectionRequest::from_input(&validated))
}

/// Stage 2: opportunity cost, from the projection rows
///
/// Option grants forward their terms so exercise costs are accounted for;
/// RSU grants forward startup terms only when dilution is simulated.
#[must_use]
pub fn derive_opportunity_cost_request(
    projection: &MonthlyProjection,
    input: &CalculationInput,
) -> Option<OpportunityCostRequest> {
    if projection.data.is_empty() {
        return None;
    }
    let validated = input.validate().ok()?;

    let startup_params = match validated.equity {
        EquityDetails::Rsu(rsu) if rsu.simulate_dilution => {
            Some(StartupParams::from_input(&validated))
        }
        _ => None,
    };

    Some(OpportunityCostRequest {
        monthly_data: projection.data.clone(),
        annual_roi: validated.job.assumed_annual_roi,
        investment_frequency: validated.job.investment_frequency,
        options_params: OptionsParams::from_input(&validated),
        startup_params,
    })
}

/// Stage 3: startup scenario, from the opportunity cost rows
#[must_use]
pub fn derive_startup_scenario_request(
    cost: &OpportunityCost,
    input: &CalculationInput,
) -> Option<StartupScenarioRequest> {
    if cost.data.is_empty() {
        return None;
    }
    let validated = input.validate().ok()?;

    Some(StartupScenarioRequest {
        opportunity_cost_data: cost.data.clone(),
        startup_params: StartupParams::from_input(&validated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_test_utils::{options_input, row, rsu_input};
    use equicalc_types::{EquityType, InvestmentFrequency, RsuDetails};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn projection() -> MonthlyProjection {
        MonthlyProjection {
            data: vec![row(json!({"Year": 1, "SalaryDifference": -2000.0}))],
        }
    }

    #[test]
    fn projection_requires_valid_input() {
        assert!(derive_projection_request(&(), &CalculationInput::new()).is_none());

        let request = derive_projection_request(&(), &rsu_input(10_000.0)).unwrap();
        assert_eq!(request.exit_year, 5);
        assert_eq!(request.current_job_monthly_salary, 8_000.0);
        assert_eq!(request.startup_monthly_salary, 10_000.0);
        assert_eq!(request.current_job_salary_growth_rate, 0.03);
    }

    #[test]
    fn opportunity_cost_needs_rows() {
        let empty = MonthlyProjection::default();
        assert!(derive_opportunity_cost_request(&empty, &rsu_input(10_000.0)).is_none());
    }

    #[test]
    fn opportunity_cost_carries_roi_and_option_terms() {
        let request = derive_opportunity_cost_request(&projection(), &options_input(9_000.0)).unwrap();
        assert_eq!(request.monthly_data, projection().data);
        assert_eq!(request.annual_roi, 0.054);
        assert_eq!(request.investment_frequency, InvestmentFrequency::Monthly);
        assert_eq!(request.options_params.unwrap().num_options, 40_000);
        assert!(request.startup_params.is_none());
    }

    #[test]
    fn rsu_dilution_forwards_startup_terms() {
        let plain = derive_opportunity_cost_request(&projection(), &rsu_input(10_000.0)).unwrap();
        assert!(plain.startup_params.is_none());
        assert!(plain.options_params.is_none());

        let mut input = rsu_input(10_000.0);
        if let Some(EquityDetails::Rsu(RsuDetails {
            simulate_dilution, ..
        })) = input.equity_details.as_mut()
        {
            *simulate_dilution = true;
        }
        let diluted = derive_opportunity_cost_request(&projection(), &input).unwrap();
        assert_eq!(diluted.startup_params.unwrap().equity_type, EquityType::Rsu);
    }

    #[test]
    fn scenario_forwards_rows_verbatim() {
        let cost = OpportunityCost {
            data: vec![row(json!({"Year": 1, "Opportunity Cost (Invested)": 1.5}))],
        };
        let request = derive_startup_scenario_request(&cost, &rsu_input(10_000.0)).unwrap();
        assert_eq!(request.opportunity_cost_data, cost.data);
        assert_eq!(request.startup_params.exit_year, 5);
        assert!(derive_startup_scenario_request(&OpportunityCost::default(), &rsu_input(1.0)).is_none());
    }
}
