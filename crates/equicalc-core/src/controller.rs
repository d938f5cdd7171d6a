//! Versioned request controller
//!
//! Owns the lifecycle of one logical request slot:
//! - Every [`issue`](RequestController::issue) bumps the version and cancels
//!   the previous attempt
//! - An attempt may only commit while it is still the live version
//! - Cancellation never surfaces as an error
//!
//! State is published through a `tokio::sync::watch` channel so observers
//! always see the latest committed snapshot.

use crate::error::RequestError;
use async_trait::async_trait;
use equicalc_client::ServiceError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// An asynchronous operation run through a [`RequestController`]
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Derived request; compared by value to skip redundant issues
    type Input: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// Committed data
    type Output: Clone + fmt::Debug + Send + Sync + 'static;

    /// Name used in logs
    const NAME: &'static str;

    /// Run one attempt
    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ServiceError>;
}

/// Monotonic request counter, one per controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestVersion(u64);

impl RequestVersion {
    /// Version before the first issue
    pub const INITIAL: Self = Self(0);

    /// Raw counter value
    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Lifecycle status of a request slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageStatus {
    /// Nothing issued, or reset
    #[default]
    Idle,
    /// In flight, no data produced yet
    Pending,
    /// In flight, previous data still visible
    Fetching,
    /// Data committed
    Success,
    /// Failure committed
    Error,
}

impl StageStatus {
    /// Whether an attempt is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Pending | Self::Fetching)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Observable snapshot of a request slot
#[derive(Debug, Clone, PartialEq)]
pub struct StageState<T> {
    /// Current status
    pub status: StageStatus,
    /// Last committed data, possibly from an older version
    pub data: Option<T>,
    /// Last committed failure
    pub error: Option<ServiceError>,
    /// Latest issued version
    pub version: RequestVersion,
    /// Version that produced `data`
    pub data_version: Option<RequestVersion>,
}

impl<T> Default for StageState<T> {
    fn default() -> Self {
        Self {
            status: StageStatus::Idle,
            data: None,
            error: None,
            version: RequestVersion::INITIAL,
            data_version: None,
        }
    }
}

impl<T> StageState<T> {
    /// Success committed by the latest issued version
    #[inline]
    #[must_use]
    pub fn is_current_success(&self) -> bool {
        self.status == StageStatus::Success && self.data_version == Some(self.version)
    }
}

/// What happened to a finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Result written to state
    Committed,
    /// Superseded or cancelled; state untouched
    Discarded,
}

struct LiveRequest {
    version: RequestVersion,
    token: CancellationToken,
}

struct Inner {
    version: RequestVersion,
    live: Option<LiveRequest>,
}

struct Shared<Op: Operation> {
    op: Op,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<StageState<Op::Output>>,
}

impl<Op: Operation> Shared<Op> {
    /// Commit an outcome if `version` is still live
    fn settle(
        &self,
        version: RequestVersion,
        outcome: Result<Op::Output, RequestError>,
    ) -> Settlement {
        let mut inner = self.inner.lock();
        let is_live = inner.live.as_ref().is_some_and(|l| l.version == version);
        if !is_live {
            trace!(
                operation = Op::NAME,
                version = %version,
                current = %inner.version,
                "discarding stale response"
            );
            return Settlement::Discarded;
        }

        let result = match outcome {
            Ok(data) => Ok(data),
            Err(RequestError::Failed(err)) => Err(err),
            Err(RequestError::Cancelled) => {
                // Only reachable if a token fired without going through cancel_live
                return Settlement::Discarded;
            }
        };
        inner.live = None;

        self.state_tx.send_modify(|state| match result {
            Ok(data) => {
                debug!(operation = Op::NAME, version = %version, "request succeeded");
                state.status = StageStatus::Success;
                state.data = Some(data);
                state.data_version = Some(version);
                state.error = None;
            }
            Err(err) => {
                warn!(operation = Op::NAME, version = %version, error = %err, "request failed");
                state.status = StageStatus::Error;
                state.error = Some(err);
            }
        });
        Settlement::Committed
    }

    /// Cancel the live attempt, optionally only if it is `only`
    fn cancel_live(&self, only: Option<RequestVersion>) -> bool {
        let mut inner = self.inner.lock();
        let matches = match (&inner.live, only) {
            (Some(live), Some(version)) => live.version == version,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }
        let Some(live) = inner.live.take() else {
            return false;
        };
        live.token.cancel();
        debug!(operation = Op::NAME, version = %live.version, "request cancelled");

        self.state_tx.send_modify(|state| {
            if state.status.is_busy() {
                state.status = if state.data.is_some() {
                    StageStatus::Success
                } else {
                    StageStatus::Idle
                };
            }
        });
        true
    }
}

/// Handle to one issued attempt
#[must_use = "dropping the handle does not cancel the request"]
pub struct RequestHandle<Op: Operation> {
    version: RequestVersion,
    shared: Arc<Shared<Op>>,
    task: JoinHandle<Settlement>,
}

impl<Op: Operation> RequestHandle<Op> {
    /// Version of this attempt
    #[inline]
    #[must_use]
    pub fn version(&self) -> RequestVersion {
        self.version
    }

    /// Cancel this attempt if it is still live
    ///
    /// Returns `false` if it already settled or was superseded.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_live(Some(self.version))
    }

    /// Wait until the attempt committed or was discarded
    pub async fn finished(self) -> Settlement {
        match self.task.await {
            Ok(settlement) => settlement,
            Err(err) => {
                warn!(operation = Op::NAME, version = %self.version, error = %err, "request task failed");
                Settlement::Discarded
            }
        }
    }
}

impl<Op: Operation> fmt::Debug for RequestHandle<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("operation", &Op::NAME)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Single-slot request controller: latest issue wins
pub struct RequestController<Op: Operation> {
    shared: Arc<Shared<Op>>,
}

impl<Op: Operation> RequestController<Op> {
    /// Create an idle controller around `op`
    pub fn new(op: Op) -> Self {
        let (state_tx, _) = watch::channel(StageState::default());
        Self {
            shared: Arc::new(Shared {
                op,
                inner: Mutex::new(Inner {
                    version: RequestVersion::INITIAL,
                    live: None,
                }),
                state_tx,
            }),
        }
    }

    /// Issue a new attempt, superseding any live one
    ///
    /// Must be called within a tokio runtime.
    pub fn issue(&self, input: Op::Input) -> RequestHandle<Op> {
        let token = CancellationToken::new();
        let version = {
            let mut inner = self.shared.inner.lock();
            let version = inner.version.next();
            inner.version = version;
            let previous = inner.live.replace(LiveRequest {
                version,
                token: token.clone(),
            });
            if let Some(previous) = previous {
                previous.token.cancel();
                trace!(operation = Op::NAME, version = %previous.version, "superseded");
            }
            self.shared.state_tx.send_modify(|state| {
                state.version = version;
                state.error = None;
                state.status = if state.data.is_some() {
                    StageStatus::Fetching
                } else {
                    StageStatus::Pending
                };
            });
            version
        };

        debug!(operation = Op::NAME, version = %version, "issuing request");

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Err(RequestError::Cancelled),
                result = shared.op.execute(input) => result.map_err(RequestError::from),
            };
            shared.settle(version, outcome)
        });

        RequestHandle {
            version,
            shared: Arc::clone(&self.shared),
            task,
        }
    }

    /// Cancel the live attempt; keeps committed data and never sets an error
    ///
    /// Returns `true` if an attempt was in flight.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_live(None)
    }

    /// Drop a committed failure while nothing is in flight
    ///
    /// Status falls back to success (older data kept) or idle. Returns
    /// `true` if an error was cleared.
    pub fn clear_error(&self) -> bool {
        let inner = self.shared.inner.lock();
        if inner.live.is_some() {
            return false;
        }
        self.shared.state_tx.send_if_modified(|state| {
            if state.status != StageStatus::Error {
                return false;
            }
            state.error = None;
            state.status = if state.data.is_some() {
                StageStatus::Success
            } else {
                StageStatus::Idle
            };
            true
        })
    }

    /// Cancel and clear all committed data; the version is kept
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(live) = inner.live.take() {
            live.token.cancel();
        }
        let version = inner.version;
        self.shared.state_tx.send_replace(StageState {
            version,
            ..StageState::default()
        });
        debug!(operation = Op::NAME, version = %version, "reset");
    }

    /// Latest issued version
    #[must_use]
    pub fn version(&self) -> RequestVersion {
        self.shared.inner.lock().version
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> StageState<Op::Output> {
        self.shared.state_tx.borrow().clone()
    }

    /// Data and its version, if the latest issue succeeded
    #[must_use]
    pub fn current(&self) -> Option<(Op::Output, RequestVersion)> {
        let state = self.shared.state_tx.borrow();
        if !state.is_current_success() {
            return None;
        }
        Some((state.data.clone()?, state.data_version?))
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StageState<Op::Output>> {
        self.shared.state_tx.subscribe()
    }
}

impl<Op: Operation> Drop for RequestController<Op> {
    fn drop(&mut self) {
        if let Some(live) = self.shared.inner.lock().live.take() {
            live.token.cancel();
        }
    }
}

impl<Op: Operation> fmt::Debug for RequestController<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestController")
            .field("operation", &Op::NAME)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_client::ErrorCode;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Echoes `value` after `delay_ms`; odd delays fail
    struct Delayed;

    #[async_trait]
    impl Operation for Delayed {
        type Input = (u64, u64);
        type Output = u64;
        const NAME: &'static str = "delayed";

        async fn execute(&self, (value, delay_ms): (u64, u64)) -> Result<u64, ServiceError> {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if delay_ms % 2 == 1 {
                return Err(ServiceError::service(ErrorCode::Calculation, "odd delay"));
            }
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_issue_is_pending_then_success() {
        let controller = RequestController::new(Delayed);
        let handle = controller.issue((7, 100));

        assert_eq!(controller.state().status, StageStatus::Pending);
        assert_eq!(handle.version(), RequestVersion(1));

        assert_eq!(handle.finished().await, Settlement::Committed);
        let state = controller.state();
        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(state.data, Some(7));
        assert!(state.is_current_success());
        assert_eq!(controller.current(), Some((7, RequestVersion(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn reissue_with_data_is_fetching() {
        let controller = RequestController::new(Delayed);
        controller.issue((1, 10)).finished().await;

        let handle = controller.issue((2, 10));
        let state = controller.state();
        assert_eq!(state.status, StageStatus::Fetching);
        assert_eq!(state.data, Some(1));
        assert!(!state.is_current_success());
        assert!(controller.current().is_none());

        handle.finished().await;
        assert_eq!(controller.state().data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stale_response_never_overwrites_newer() {
        let controller = RequestController::new(Delayed);
        let slow = controller.issue((1, 500));
        let fast = controller.issue((2, 20));

        assert_eq!(fast.finished().await, Settlement::Committed);
        assert_eq!(slow.finished().await, Settlement::Discarded);

        let state = controller.state();
        assert_eq!(state.data, Some(2));
        assert_eq!(state.data_version, Some(RequestVersion(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_committed_with_previous_data() {
        let controller = RequestController::new(Delayed);
        controller.issue((4, 10)).finished().await;
        controller.issue((5, 11)).finished().await;

        let state = controller.state();
        assert_eq!(state.status, StageStatus::Error);
        assert_eq!(state.data, Some(4));
        assert_eq!(
            state.error.as_ref().and_then(ServiceError::code),
            Some(ErrorCode::Calculation)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_never_sets_error() {
        let controller = RequestController::new(Delayed);
        let handle = controller.issue((1, 1_000));
        assert!(controller.cancel());

        let state = controller.state();
        assert_eq!(state.status, StageStatus::Idle);
        assert!(state.error.is_none());
        assert_eq!(handle.finished().await, Settlement::Discarded);

        controller.issue((3, 10)).finished().await;
        let handle = controller.issue((4, 1_000));
        assert!(handle.cancel());
        let state = controller.state();
        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(state.data, Some(3));
        assert!(state.error.is_none());
        assert!(!controller.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_cancel_ignores_superseded_attempt() {
        let controller = RequestController::new(Delayed);
        let old = controller.issue((1, 1_000));
        let new = controller.issue((2, 100));

        assert!(!old.cancel());
        assert_eq!(controller.state().status, StageStatus::Pending);
        assert_eq!(new.finished().await, Settlement::Committed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_data_and_keeps_version() {
        let controller = RequestController::new(Delayed);
        controller.issue((9, 10)).finished().await;
        let pending = controller.issue((10, 1_000));

        controller.reset();
        let state = controller.state();
        assert_eq!(state.status, StageStatus::Idle);
        assert!(state.data.is_none());
        assert_eq!(state.version, RequestVersion(2));
        assert_eq!(pending.finished().await, Settlement::Discarded);

        assert_eq!(controller.issue((11, 10)).version(), RequestVersion(3));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_error_restores_previous_data() {
        let controller = RequestController::new(Delayed);
        controller.issue((4, 10)).finished().await;
        controller.issue((5, 11)).finished().await;

        assert!(controller.clear_error());
        let state = controller.state();
        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(state.data, Some(4));
        assert!(state.error.is_none());
        assert!(!state.is_current_success());
        assert!(!controller.clear_error());

        // In-flight attempts are left alone
        controller.issue((7, 11)).finished().await;
        let _live = controller.issue((8, 1_000));
        assert!(!controller.clear_error());
        assert_eq!(controller.state().status, StageStatus::Fetching);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_commit() {
        let controller = RequestController::new(Delayed);
        let mut rx = controller.subscribe();
        let _handle = controller.issue((5, 50));

        let state = rx
            .wait_for(|s| s.status == StageStatus::Success)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.data, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_cancels_live_attempt() {
        let controller = RequestController::new(Delayed);
        let mut rx = controller.subscribe();
        let handle = controller.issue((5, 1_000));
        drop(controller);

        assert_eq!(handle.finished().await, Settlement::Discarded);
        assert_eq!(rx.borrow_and_update().status, StageStatus::Pending);
    }
}
