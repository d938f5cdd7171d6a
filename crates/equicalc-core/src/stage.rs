//! Pipeline stage: a request controller plus its derivation
//!
//! A stage remembers the request it last issued and the upstream version it
//! was derived from. Re-deriving issues a new request when either changed:
//! a new upstream version always re-issues, while a changed input snapshot
//! re-issues only if the derived request differs.

use crate::controller::{Operation, RequestController, RequestVersion, StageState, StageStatus};
use equicalc_types::CalculationInput;
use tokio::sync::watch;

/// Pure derivation of a stage request
pub type DeriveFn<U, I> = fn(&U, &CalculationInput) -> Option<I>;

/// Result of re-deriving a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// A new request went out with this version
    Issued(RequestVersion),
    /// Derived request identical and upstream unchanged
    Unchanged,
    /// Required data missing; nothing issued
    Missing,
}

/// Short description of a stage for published state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    /// Operation name
    pub name: &'static str,
    /// Current status
    pub status: StageStatus,
    /// Latest issued version
    pub version: RequestVersion,
}

/// One link of the dependency chain
pub struct PipelineStage<U, Op: Operation> {
    controller: RequestController<Op>,
    derive: DeriveFn<U, Op::Input>,
    issued_input: Option<Op::Input>,
    upstream_version: Option<RequestVersion>,
    seen_upstream: Option<RequestVersion>,
}

impl<U, Op: Operation> PipelineStage<U, Op> {
    /// Create an idle stage
    pub fn new(op: Op, derive: DeriveFn<U, Op::Input>) -> Self {
        Self {
            controller: RequestController::new(op),
            derive,
            issued_input: None,
            upstream_version: None,
            seen_upstream: None,
        }
    }

    /// Re-derive against `upstream` (produced by `upstream_version`)
    pub fn refresh(
        &mut self,
        upstream: &U,
        upstream_version: RequestVersion,
        input: &CalculationInput,
    ) -> Derivation {
        self.seen_upstream = Some(upstream_version);
        let Some(request) = (self.derive)(upstream, input) else {
            return Derivation::Missing;
        };

        let upstream_changed = self.upstream_version != Some(upstream_version);
        let input_changed = self.issued_input.as_ref() != Some(&request);
        if !upstream_changed && !input_changed {
            return Derivation::Unchanged;
        }

        self.upstream_version = Some(upstream_version);
        self.issued_input = Some(request.clone());
        let handle = self.controller.issue(request);
        Derivation::Issued(handle.version())
    }

    /// Cancel the in-flight request, if any
    ///
    /// A cancelled request never delivered its result, so the next refresh
    /// re-issues even for an identical derivation.
    pub fn cancel(&mut self) {
        if self.controller.cancel() {
            self.issued_input = None;
            self.upstream_version = None;
        }
    }

    /// Cancel work derived from upstream data that is being replaced
    ///
    /// Drops the in-flight request and any committed failure; older data
    /// stays visible until the stage is re-derived.
    pub fn supersede(&mut self) {
        self.cancel();
        self.controller.clear_error();
    }

    /// Forget everything derived so far; no-op when already clear
    ///
    /// Used when the current upstream no longer yields a request, so
    /// nothing committed here may be reported.
    pub fn discard(&mut self) {
        let state = self.controller.state();
        if state.status != StageStatus::Idle || state.data.is_some() || state.error.is_some() {
            self.controller.reset();
        }
        self.issued_input = None;
        self.upstream_version = None;
    }

    /// Cancel and clear data, forgetting what was issued
    pub fn reset(&mut self) {
        self.controller.reset();
        self.issued_input = None;
        self.upstream_version = None;
        self.seen_upstream = None;
    }

    /// Whether the stage has not been derived from `upstream` yet
    ///
    /// `upstream` is the version of the upstream's current success, if any.
    #[must_use]
    pub fn lags(&self, upstream: Option<RequestVersion>) -> bool {
        upstream.is_some_and(|version| self.seen_upstream != Some(version))
    }

    /// Data and version if the latest issue succeeded
    #[must_use]
    pub fn current(&self) -> Option<(Op::Output, RequestVersion)> {
        self.controller.current()
    }

    /// Snapshot of the controller state
    #[must_use]
    pub fn state(&self) -> StageState<Op::Output> {
        self.controller.state()
    }

    /// Subscribe to controller state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StageState<Op::Output>> {
        self.controller.subscribe()
    }

    /// Name, status and version for published state
    #[must_use]
    pub fn summary(&self) -> StageSummary {
        let state = self.controller.state();
        StageSummary {
            name: Op::NAME,
            status: state.status,
            version: state.version,
        }
    }
}
