//! Simulation session state machine
//!
//! `idle → connecting → running → complete | error | cancelled`
//!
//! Each run gets a fresh [`RunId`]. The run task writes state only while its
//! id is the session's current run and the run is not terminal; the check
//! happens inside the `watch` write lock, at the moment of the event.

use super::transport::{SimulationConnection, SimulationTransport};
use crate::error::SimulationError;
use equicalc_types::{ProgressUpdate, SimulationConfig, SimulationFrame, SimulationResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Identifier of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimulationStatus {
    /// No run started
    #[default]
    Idle,
    /// Opening the connection
    Connecting,
    /// Config sent, reading frames
    Running,
    /// Result received
    Complete,
    /// Run failed
    Error,
    /// Closed by the client
    Cancelled,
}

impl SimulationStatus {
    /// Connecting or running
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Running)
    }

    /// Complete, failed or cancelled
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Observable session snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    /// Lifecycle status
    pub status: SimulationStatus,
    /// Current run
    pub run: Option<RunId>,
    /// Latest progress frame
    pub progress: Option<ProgressUpdate>,
    /// Final result
    pub result: Option<SimulationResult>,
    /// Failure of the run
    pub error: Option<SimulationError>,
    /// Connection open
    pub connected: bool,
}

struct RunControl {
    id: RunId,
    token: CancellationToken,
}

struct Shared {
    state_tx: watch::Sender<SimulationState>,
    current: Mutex<Option<RunControl>>,
}

impl Shared {
    /// Apply `f` if `id` is the current, non-terminal run
    fn update(&self, id: RunId, f: impl FnOnce(&mut SimulationState)) -> bool {
        self.state_tx.send_if_modified(|state| {
            if state.run != Some(id) || state.status.is_terminal() {
                return false;
            }
            f(state);
            true
        })
    }

    fn finish(&self, id: RunId, outcome: Result<SimulationResult, SimulationError>) {
        let applied = self.update(id, |state| {
            state.connected = false;
            match outcome {
                Ok(result) => {
                    info!(run = %id, "simulation complete");
                    state.status = SimulationStatus::Complete;
                    state.result = Some(result);
                }
                Err(err) => {
                    warn!(run = %id, error = %err, "simulation failed");
                    state.status = SimulationStatus::Error;
                    state.error = Some(err);
                }
            }
        });
        if !applied {
            debug!(run = %id, "outcome of superseded run dropped");
        }
    }

    fn cancel_current(&self) -> bool {
        let Some(control) = self.current.lock().take() else {
            return false;
        };
        control.token.cancel();
        let cancelled = self.update(control.id, |state| {
            state.status = SimulationStatus::Cancelled;
            state.connected = false;
        });
        if cancelled {
            info!(run = %control.id, "simulation cancelled");
        }
        cancelled
    }
}

/// Streaming simulation session
///
/// At most one connection is open at a time: starting a new run tears down
/// the previous one first.
pub struct SimulationSession {
    transport: Arc<dyn SimulationTransport>,
    shared: Arc<Shared>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SimulationSession {
    /// Create an idle session
    pub fn new(transport: Arc<dyn SimulationTransport>) -> Self {
        let (state_tx, _) = watch::channel(SimulationState::default());
        Self {
            transport,
            shared: Arc::new(Shared {
                state_tx,
                current: Mutex::new(None),
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Start a run, replacing any active one
    ///
    /// Resolves once the previous run is torn down and the new run task is
    /// spawned; progress is observed through [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    /// Returns [`SimulationError::Validation`] for an invalid config; nothing
    /// is sent and the current run is left alone.
    pub async fn start(&self, config: SimulationConfig) -> Result<RunId, SimulationError> {
        config.validate()?;

        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            self.shared.cancel_current();
            if let Err(err) = previous.await {
                warn!(error = %err, "previous simulation task failed");
            }
        }

        let id = RunId::new();
        let token = CancellationToken::new();
        *self.shared.current.lock() = Some(RunControl {
            id,
            token: token.clone(),
        });
        self.shared.state_tx.send_replace(SimulationState {
            status: SimulationStatus::Connecting,
            run: Some(id),
            ..SimulationState::default()
        });
        info!(
            run = %id,
            n_simulations = config.n_simulations,
            batch_size = config.batch_size,
            "simulation starting"
        );

        let future = run(
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
            id,
            token,
            config,
        );
        *task = Some(tokio::spawn(
            future.instrument(info_span!("simulation", run = %id)),
        ));
        Ok(id)
    }

    /// Close the connection without waiting for a terminal frame
    ///
    /// Returns `true` if an active run was cancelled.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_current()
    }

    /// Wait until the current run is no longer active
    pub async fn wait(&self) -> SimulationState {
        let mut rx = self.shared.state_tx.subscribe();
        let result = rx
            .wait_for(|state| !state.status.is_active())
            .await
            .map(|state| state.clone());
        match result {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }

    /// Cancel and wait for the connection to be torn down
    pub async fn dispose(&self) {
        let mut task = self.task.lock().await;
        self.shared.cancel_current();
        if let Some(previous) = task.take() {
            if let Err(err) = previous.await {
                warn!(error = %err, "simulation task failed");
            }
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn state(&self) -> SimulationState {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SimulationState> {
        self.shared.state_tx.subscribe()
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        self.shared.cancel_current();
    }
}

impl fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationSession")
            .field("state", &*self.shared.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

async fn run(
    transport: Arc<dyn SimulationTransport>,
    shared: Arc<Shared>,
    id: RunId,
    token: CancellationToken,
    config: SimulationConfig,
) {
    let connected = tokio::select! {
        biased;
        () = token.cancelled() => return,
        connected = transport.connect() => connected,
    };
    let mut connection = match connected {
        Ok(connection) => connection,
        Err(err) => {
            shared.finish(id, Err(err.into()));
            return;
        }
    };
    shared.update(id, |state| state.connected = true);

    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => None,
        outcome = stream(connection.as_mut(), &shared, id, &config) => Some(outcome),
    };

    if let Err(err) = connection.close().await {
        debug!(error = %err, "closing simulation connection failed");
    }
    drop(connection);

    if let Some(outcome) = outcome {
        shared.finish(id, outcome);
    }
}

/// Send the config and read frames until a terminal one
async fn stream(
    connection: &mut dyn SimulationConnection,
    shared: &Shared,
    id: RunId,
    config: &SimulationConfig,
) -> Result<SimulationResult, SimulationError> {
    let payload = serde_json::to_string(config)
        .map_err(|e| SimulationError::Protocol(format!("cannot encode config: {e}")))?;
    connection.send(payload).await?;
    shared.update(id, |state| state.status = SimulationStatus::Running);

    let mut last_percentage: Option<f64> = None;
    loop {
        let text = match connection.recv().await {
            Some(Ok(text)) => text,
            Some(Err(err)) => return Err(err.into()),
            None => {
                return Err(SimulationError::Connection(
                    "connection closed before completion".into(),
                ))
            }
        };

        let frame = SimulationFrame::parse(&text).map_err(|err| {
            debug!(error = %err, "undecodable simulation frame");
            SimulationError::Protocol("malformed frame from simulation service".into())
        })?;

        match frame {
            SimulationFrame::Progress(progress) => {
                if !progress.is_well_formed() {
                    return Err(SimulationError::Protocol("inconsistent progress frame".into()));
                }
                if last_percentage.is_some_and(|last| progress.percentage < last) {
                    return Err(SimulationError::Protocol("progress went backwards".into()));
                }
                last_percentage = Some(progress.percentage);
                shared.update(id, |state| state.progress = Some(progress));
            }
            SimulationFrame::Complete(result) => return Ok(result),
            SimulationFrame::Error { message } => return Err(SimulationError::Server(message)),
        }
    }
}
