//! `equicalc calculate`

use super::{load_client_config, load_toml};
use anyhow::Result;
use equicalc_client::HttpCalculationService;
use equicalc_core::{CalculationPipeline, PipelineState};
use equicalc_types::{CalculationInput, StartupScenario};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

pub(crate) struct Options {
    pub(crate) input: PathBuf,
    pub(crate) config: Option<PathBuf>,
    pub(crate) json: bool,
}

pub(crate) async fn run(options: Options) -> Result<ExitCode> {
    let client = load_client_config(options.config.as_deref())?;
    let input: CalculationInput = load_toml(&options.input)?;

    if let Err(err) = input.validate() {
        eprintln!("Scenario is incomplete:");
        for issue in &err.issues {
            eprintln!("  - {issue}");
        }
        return Ok(ExitCode::from(2));
    }

    info!(api = %client.api_base_url, "running calculation");
    let service = HttpCalculationService::new(&client)?;
    let pipeline = CalculationPipeline::spawn(Arc::new(service));
    pipeline.set_input(input);
    let state = pipeline.settled().await;
    pipeline.dispose().await;

    Ok(if report(&state, options.json)? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print the outcome; `false` when no result was produced
fn report(state: &PipelineState, json: bool) -> Result<bool> {
    if let Some(err) = &state.error {
        eprintln!("{}: {}", err.kind().title(), err.message());
        if let Some(request_id) = err.context().and_then(|c| c.request_id.as_deref()) {
            eprintln!("  request id: {request_id}");
        }
        return Ok(false);
    }
    let Some(result) = &state.result else {
        eprintln!("No result produced");
        return Ok(false);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", render(result));
    }
    Ok(true)
}

fn render(result: &StartupScenario) -> String {
    let mut out = String::new();
    out.push_str("Startup Scenario\n");
    out.push_str("================\n");
    out.push_str(&format!(
        "{}: {:.2}\n",
        result.payout_label, result.final_payout_value
    ));
    out.push_str(&format!(
        "Opportunity cost: {:.2}\n",
        result.final_opportunity_cost
    ));
    out.push_str(&format!("Net outcome: {:.2}\n", result.net_outcome()));
    if let Some(dilution) = result.total_dilution {
        out.push_str(&format!("Total dilution: {:.2}%\n", dilution * 100.0));
    }
    if let Some(pct) = result.diluted_equity_pct {
        out.push_str(&format!("Diluted equity: {pct:.4}%\n"));
    }
    out.push_str(&format!("{}\n", result.breakeven_label));
    out.push_str(&format!("Years projected: {}\n", result.results_df.len()));
    out
}
