//! Dependency-chained pipeline executor
//!
//! Three stages run strictly in order:
//! monthly projection → opportunity cost → startup scenario.
//!
//! A single driver task owns every stage. The [`CalculationPipeline`] handle
//! sends it commands over an mpsc channel; stage transitions reach it through
//! `watch` receivers. After every event the driver walks the chain once:
//!
//! - A stage is only issued when its upstream succeeded at its latest version
//! - Issuing a stage supersedes everything downstream of it
//! - A stage whose upstream no longer yields a request is discarded along
//!   with everything below it
//! - The walk stops at the first stage that is busy, failed or missing data
//!
//! The public [`PipelineState`] is published after each walk, so observers
//! never see a half-applied command.

use crate::controller::{RequestVersion, StageStatus};
use crate::derive::{
    derive_opportunity_cost_request, derive_projection_request, derive_startup_scenario_request,
};
use crate::operations::{MonthlyProjectionOp, OpportunityCostOp, StartupScenarioOp};
use crate::stage::{Derivation, PipelineStage, StageSummary};
use equicalc_client::{CalculationService, ErrorKind, ServiceError};
use equicalc_types::{
    CalculationInput, MonthlyProjection, OpportunityCost, StartupScenario, ValidationError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Aggregated, observable pipeline state
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Latest snapshot passed validation
    pub has_valid_input: bool,
    /// Why the latest snapshot was rejected
    pub validation_error: Option<ValidationError>,
    /// No final result yet and a stage is in flight
    pub is_pending: bool,
    /// Final result visible and a stage is in flight
    pub is_fetching: bool,
    /// Last successful final result
    pub result: Option<StartupScenario>,
    /// First failure in chain order
    pub error: Option<ServiceError>,
    /// Classification of `error`
    pub error_kind: Option<ErrorKind>,
    /// Per-stage status, in chain order
    pub stages: Vec<StageSummary>,
    /// Number of commands applied by the driver
    pub revision: u64,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            has_valid_input: false,
            validation_error: None,
            is_pending: false,
            is_fetching: false,
            result: None,
            error: None,
            error_kind: None,
            stages: Vec::new(),
            revision: 0,
        }
    }
}

impl PipelineState {
    /// Whether any stage is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.is_pending || self.is_fetching
    }

    /// Summary of the named stage
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug)]
enum Command {
    SetInput(Box<CalculationInput>),
    Retry,
    Reset,
    Dispose,
}

/// Handle to a running pipeline
///
/// Dropping the handle stops the driver and cancels every in-flight request.
pub struct CalculationPipeline {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<PipelineState>,
    sent: AtomicU64,
    driver: Option<JoinHandle<()>>,
}

impl CalculationPipeline {
    /// Spawn the driver task
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(service: Arc<dyn CalculationService>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(service);
        let (state_tx, state_rx) = watch::channel(driver.snapshot());
        let task = tokio::spawn(driver.run(command_rx, state_tx));

        info!("calculation pipeline started");
        Self {
            commands,
            state_rx,
            sent: AtomicU64::new(0),
            driver: Some(task),
        }
    }

    /// Replace the input snapshot
    pub fn set_input(&self, input: CalculationInput) {
        self.send(Command::SetInput(Box::new(input)));
    }

    /// Reset every stage and re-run from the first with the current input
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    /// Cancel and clear every stage and forget the input
    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Latest published state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }

    /// Wait until every command sent so far is applied and no stage is busy
    pub async fn settled(&self) -> PipelineState {
        let sent = self.sent.load(Ordering::Acquire);
        let mut rx = self.state_rx.clone();
        let result = rx
            .wait_for(|state| state.revision >= sent && !state.is_busy())
            .await
            .map(|state| state.clone());
        match result {
            Ok(state) => state,
            // Driver gone: whatever was published last is final
            Err(_) => rx.borrow().clone(),
        }
    }

    /// Stop the driver and wait for it to cancel every stage
    pub async fn dispose(mut self) {
        let _ = self.commands.send(Command::Dispose);
        if let Some(driver) = self.driver.take() {
            if let Err(err) = driver.await {
                warn!(error = %err, "pipeline driver failed");
            }
        }
    }

    fn send(&self, command: Command) {
        self.sent.fetch_add(1, Ordering::AcqRel);
        if self.commands.send(command).is_err() {
            warn!("pipeline driver is gone; command dropped");
        }
    }
}

impl Drop for CalculationPipeline {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.commands.send(Command::Dispose);
        }
    }
}

impl std::fmt::Debug for CalculationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationPipeline")
            .field("sent", &self.sent.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DRIVER
// =============================================================================

struct Driver {
    projection: PipelineStage<(), MonthlyProjectionOp>,
    cost: PipelineStage<MonthlyProjection, OpportunityCostOp>,
    scenario: PipelineStage<OpportunityCost, StartupScenarioOp>,
    input: Option<CalculationInput>,
    validation_error: Option<ValidationError>,
    revision: u64,
}

impl Driver {
    fn new(service: Arc<dyn CalculationService>) -> Self {
        Self {
            projection: PipelineStage::new(
                MonthlyProjectionOp::new(Arc::clone(&service)),
                derive_projection_request,
            ),
            cost: PipelineStage::new(
                OpportunityCostOp::new(Arc::clone(&service)),
                derive_opportunity_cost_request,
            ),
            scenario: PipelineStage::new(
                StartupScenarioOp::new(service),
                derive_startup_scenario_request,
            ),
            input: None,
            validation_error: None,
            revision: 0,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<PipelineState>,
    ) {
        let mut projection_rx = self.projection.subscribe();
        let mut cost_rx = self.cost.subscribe();
        let mut scenario_rx = self.scenario.subscribe();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.revision += 1;
                    match command {
                        Command::SetInput(input) => self.set_input(*input),
                        Command::Retry => self.retry(),
                        Command::Reset => self.reset(),
                        Command::Dispose => break,
                    }
                }
                Ok(()) = projection_rx.changed() => {}
                Ok(()) = cost_rx.changed() => {}
                Ok(()) = scenario_rx.changed() => {}
            }

            self.propagate();
            state_tx.send_replace(self.snapshot());
        }

        self.cancel_all();
        state_tx.send_replace(self.snapshot());
        info!("calculation pipeline stopped");
    }

    fn set_input(&mut self, input: CalculationInput) {
        self.validation_error = input.validate().err();
        if let Some(err) = &self.validation_error {
            debug!(issues = err.issues.len(), "input not ready");
        }
        self.input = Some(input);
    }

    fn retry(&mut self) {
        debug!("retrying pipeline from the first stage");
        self.projection.reset();
        self.cost.reset();
        self.scenario.reset();
    }

    fn reset(&mut self) {
        debug!("resetting pipeline");
        self.projection.reset();
        self.cost.reset();
        self.scenario.reset();
        self.input = None;
        self.validation_error = None;
    }

    fn cancel_all(&mut self) {
        self.projection.cancel();
        self.cost.cancel();
        self.scenario.cancel();
    }

    /// Walk the chain once, issuing at most one stage
    fn propagate(&mut self) {
        let Some(input) = self.input.as_ref() else {
            return;
        };

        match self.projection.refresh(&(), RequestVersion::INITIAL, input) {
            Derivation::Issued(version) => {
                debug!(version = %version, "monthly projection issued");
                self.cost.supersede();
                self.scenario.supersede();
                return;
            }
            Derivation::Missing => {
                self.cancel_all();
                return;
            }
            Derivation::Unchanged => {}
        }

        let Some((projection, version)) = self.projection.current() else {
            return;
        };
        match self.cost.refresh(&projection, version, input) {
            Derivation::Issued(version) => {
                debug!(version = %version, "opportunity cost issued");
                self.scenario.supersede();
                return;
            }
            Derivation::Missing => {
                debug!("monthly projection has no rows");
                self.cost.discard();
                self.scenario.discard();
                return;
            }
            Derivation::Unchanged => {}
        }

        let Some((cost, version)) = self.cost.current() else {
            return;
        };
        match self.scenario.refresh(&cost, version, input) {
            Derivation::Issued(version) => debug!(version = %version, "startup scenario issued"),
            Derivation::Missing => {
                debug!("opportunity cost has no rows");
                self.scenario.discard();
            }
            Derivation::Unchanged => {}
        }
    }

    fn snapshot(&self) -> PipelineState {
        let projection = self.projection.state();
        let cost = self.cost.state();
        let scenario = self.scenario.state();

        // A stage whose upstream committed a newer success than the one it was
        // derived from is about to be re-issued by the next walk
        let lagging = self
            .cost
            .lags(projection.is_current_success().then_some(projection.version))
            || self
                .scenario
                .lags(cost.is_current_success().then_some(cost.version));
        let busy = lagging
            || projection.status.is_busy()
            || cost.status.is_busy()
            || scenario.status.is_busy();
        let error = [&projection.error, &cost.error, &scenario.error]
            .into_iter()
            .zip([projection.status, cost.status, scenario.status])
            .find_map(|(error, status)| match status {
                StageStatus::Error => error.clone(),
                _ => None,
            });
        let result = scenario.data;

        PipelineState {
            has_valid_input: self.input.is_some() && self.validation_error.is_none(),
            validation_error: self.validation_error.clone(),
            is_pending: busy && result.is_none(),
            is_fetching: busy && result.is_some(),
            error_kind: error.as_ref().map(ServiceError::kind),
            error,
            result,
            stages: vec![
                self.projection.summary(),
                self.cost.summary(),
                self.scenario.summary(),
            ],
            revision: self.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_client::{Endpoint, ErrorCode};
    use equicalc_test_utils::{rsu_input, FakeCalculationService};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn pipeline() -> (Arc<FakeCalculationService>, CalculationPipeline) {
        let service = Arc::new(FakeCalculationService::new());
        let pipeline = CalculationPipeline::spawn(service.clone());
        (service, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_all_three_stages_in_order() {
        let (service, pipeline) = pipeline();
        pipeline.set_input(rsu_input(10_000.0));

        let state = pipeline.settled().await;
        assert!(state.has_valid_input);
        assert!(state.error.is_none());
        let result = state.result.unwrap();
        assert_eq!(result.results_df[0]["StartupSalary"], json!(10_000.0));

        let order: Vec<_> = service.calls().iter().map(|c| c.endpoint()).collect();
        assert_eq!(
            order,
            vec![
                Endpoint::MonthlyProjection,
                Endpoint::OpportunityCost,
                Endpoint::StartupScenario
            ]
        );
        assert!(state
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_dispatches_nothing() {
        let (service, pipeline) = pipeline();
        pipeline.set_input(CalculationInput::new());

        let state = pipeline.settled().await;
        assert!(!state.has_valid_input);
        assert!(state.validation_error.unwrap().has_issue("current_job"));
        assert!(service.calls().is_empty());
        assert!(!state.is_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_until_first_result_then_fetching() {
        let (service, pipeline) = pipeline();
        service.set_delay(Endpoint::MonthlyProjection, Duration::from_millis(100));
        let mut rx = pipeline.subscribe();

        pipeline.set_input(rsu_input(10_000.0));
        let state = rx.wait_for(|s| s.revision == 1).await.unwrap().clone();
        assert!(state.is_pending);
        assert!(!state.is_fetching);

        pipeline.settled().await;
        pipeline.set_input(rsu_input(11_000.0));
        let state = rx.wait_for(|s| s.revision == 2).await.unwrap().clone();
        assert!(state.is_fetching);
        assert!(state.result.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_input_issues_nothing() {
        let (service, pipeline) = pipeline();
        pipeline.set_input(rsu_input(10_000.0));
        pipeline.settled().await;

        pipeline.set_input(rsu_input(10_000.0));
        pipeline.settled().await;
        assert_eq!(service.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_halts_chain_and_keeps_last_result() {
        let (service, pipeline) = pipeline();
        pipeline.set_input(rsu_input(10_000.0));
        let first = pipeline.settled().await.result;

        service.fail_next(
            Endpoint::OpportunityCost,
            ServiceError::service(ErrorCode::RateLimit, "slow down"),
        );
        pipeline.set_input(rsu_input(12_000.0));
        let state = pipeline.settled().await;

        assert_eq!(state.error_kind, Some(ErrorKind::RateLimit));
        assert_eq!(state.result, first);
        assert_eq!(service.call_count(Endpoint::StartupScenario), 1);
        assert_eq!(
            state.stage("opportunity_cost").map(|s| s.status),
            Some(StageStatus::Error)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reissues_with_current_input() {
        let (service, pipeline) = pipeline();
        service.fail_next(
            Endpoint::MonthlyProjection,
            ServiceError::network("connection reset"),
        );
        pipeline.set_input(rsu_input(10_000.0));
        let state = pipeline.settled().await;
        assert_eq!(state.error_kind, Some(ErrorKind::Network));

        pipeline.retry();
        let state = pipeline.settled().await;
        assert!(state.error.is_none());
        assert!(state.result.is_some());
        assert_eq!(service.call_count(Endpoint::MonthlyProjection), 2);
    }

    /// Walk the chain until nothing is busy, without the driver loop
    async fn drive(driver: &mut Driver) -> PipelineState {
        loop {
            driver.propagate();
            let state = driver.snapshot();
            if !state.is_busy() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_commit_before_next_walk_counts_as_busy() {
        let service = Arc::new(FakeCalculationService::new());
        let mut driver = Driver::new(service);
        driver.set_input(rsu_input(10_000.0));
        let first = drive(&mut driver).await;

        driver.set_input(rsu_input(12_000.0));
        driver.propagate();
        // Stage 1 commits before the driver gets to walk the chain again
        driver
            .projection
            .subscribe()
            .wait_for(|s| s.is_current_success())
            .await
            .unwrap();

        let state = driver.snapshot();
        assert!(state.is_fetching);
        assert_eq!(state.result, first.result);
        assert_eq!(
            state.stage("monthly_projection").map(|s| s.status),
            Some(StageStatus::Success)
        );

        let state = drive(&mut driver).await;
        assert_eq!(
            state.result.unwrap().results_df[0]["StartupSalary"],
            json!(12_000.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_forgets_everything() {
        let (_service, pipeline) = pipeline();
        pipeline.set_input(rsu_input(10_000.0));
        pipeline.settled().await;

        pipeline.reset();
        let state = pipeline.settled().await;
        assert!(!state.has_valid_input);
        assert!(state.result.is_none());
        assert!(state.stages.iter().all(|s| s.status == StageStatus::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_in_flight_requests() {
        let (service, pipeline) = pipeline();
        service.set_delay(Endpoint::MonthlyProjection, Duration::from_secs(10));
        let rx = pipeline.subscribe();

        pipeline.set_input(rsu_input(10_000.0));
        tokio::time::sleep(Duration::from_millis(1)).await;
        pipeline.dispose().await;

        let state = rx.borrow().clone();
        assert!(!state.is_busy());
        assert!(state.error.is_none());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(service.completed_count(Endpoint::MonthlyProjection), 0);
        assert_eq!(service.call_count(Endpoint::OpportunityCost), 0);
    }
}
