//! `equicalc simulate`

use super::{load_client_config, load_toml};
use anyhow::Result;
use equicalc_core::{SimulationSession, SimulationState, SimulationStatus, WsTransport};
use equicalc_types::{SimulationConfig, SimulationResult};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) struct Options {
    pub(crate) simulation: PathBuf,
    pub(crate) config: Option<PathBuf>,
    pub(crate) url: Option<String>,
}

pub(crate) async fn run(options: Options) -> Result<ExitCode> {
    let mut client = load_client_config(options.config.as_deref())?;
    if let Some(url) = options.url {
        client = client.with_simulation_url(url);
        client.validate()?;
    }
    let config: SimulationConfig = load_toml(&options.simulation)?;

    let session = SimulationSession::new(Arc::new(WsTransport::from_config(&client)));
    let mut rx = session.subscribe();
    let run = session.start(config).await?;
    info!(run = %run, url = %client.simulation_url, "simulation started");

    let mut last_current = None;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if let Some(progress) = state.progress {
                    if last_current != Some(progress.current) {
                        last_current = Some(progress.current);
                        eprintln!(
                            "[{:>5.1}%] {}/{}",
                            progress.percentage, progress.current, progress.total
                        );
                    }
                }
                if !state.status.is_active() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, closing simulation");
                session.cancel();
            }
        }
    }

    let state = session.wait().await;
    session.dispose().await;
    Ok(if report(&state) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(state: &SimulationState) -> bool {
    match state.status {
        SimulationStatus::Complete => {
            if let Some(result) = &state.result {
                print!("{}", render(result));
            }
            true
        }
        SimulationStatus::Error => {
            if let Some(err) = &state.error {
                eprintln!("Simulation failed ({}): {err}", err.kind());
            }
            false
        }
        status => {
            eprintln!("Simulation {status}");
            false
        }
    }
}

fn render(result: &SimulationResult) -> String {
    let mut out = String::from("Simulation Result\n=================\n");
    for (key, value) in &result.payload {
        if let Some(series) = result.series(key) {
            if series.is_empty() {
                out.push_str(&format!("{key}: (empty)\n"));
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = series.iter().sum::<f64>() / series.len() as f64;
            out.push_str(&format!("{key}: {} samples, mean {mean:.2}\n", series.len()));
        } else if let Some(scalar) = result.scalar(key) {
            out.push_str(&format!("{key}: {scalar:.4}\n"));
        } else {
            out.push_str(&format!("{key}: {value}\n"));
        }
    }
    out
}
