//! Run state machine and interrupt wiring.
//!
//! A run moves `Running -> Draining -> Finalizing -> (Done | DonePartial)`.
//! Cancellation is cooperative: the orchestrator checks the token once per
//! polling interval, and workers check it before starting a batch. A batch
//! that has already started always runs to completion.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Batches are being submitted and executed.
    Running,
    /// Nothing new is submitted; only outcomes that can still extend the
    /// prefix are awaited.
    Draining,
    /// Salvaging delivered outcomes and building the prefix.
    Finalizing,
    /// Every requested index was computed.
    Done,
    /// Fewer indices than requested, after an interrupt or a failed batch.
    DonePartial,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::DonePartial)
    }
}

/// Why a run left `Running` early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The first failed batch in plan order.
    BatchFailure { ordinal: usize },
}

#[derive(Debug)]
pub struct InterruptController {
    state: RunState,
    stop: Option<StopReason>,
    cancel: CancellationToken,
}

impl InterruptController {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: RunState::Running,
            stop: None,
            cancel,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Observes the cancellation token. Returns true once the run is cancelled.
    pub fn check_cancelled(&mut self) -> bool {
        if self.stop == Some(StopReason::Cancelled) {
            return true;
        }
        let settled = self.state.is_terminal() || self.state == RunState::Finalizing;
        if !self.cancel.is_cancelled() || settled {
            return false;
        }
        // A user interrupt overrides a failure drain: stop waiting altogether.
        self.stop = Some(StopReason::Cancelled);
        self.transition(RunState::Draining);
        warn!("Cancellation requested, no further batches will be started");
        true
    }

    /// Records a failed batch and returns the ordinal past which nothing is
    /// worth waiting for.
    pub fn batch_failed(&mut self, ordinal: usize) -> usize {
        match self.stop {
            Some(StopReason::BatchFailure { ordinal: first }) if first <= ordinal => first,
            Some(StopReason::Cancelled) => ordinal,
            _ => {
                self.stop = Some(StopReason::BatchFailure { ordinal });
                if self.state == RunState::Running {
                    self.transition(RunState::Draining);
                }
                ordinal
            }
        }
    }

    pub fn accepts_submissions(&self) -> bool {
        self.state == RunState::Running
    }

    /// Batches below the returned ordinal are still worth waiting for.
    pub fn wait_bound(&self, total: usize) -> usize {
        match (self.state, self.stop) {
            (RunState::Running, _) => total,
            (RunState::Draining, Some(StopReason::BatchFailure { ordinal })) => ordinal.min(total),
            _ => 0,
        }
    }

    pub fn begin_finalizing(&mut self) {
        self.transition(RunState::Finalizing);
    }

    /// Moves to the terminal state for a run that reached `achieved` of
    /// `requested` values.
    pub fn finish(&mut self, achieved: u64, requested: u64) -> RunState {
        let terminal = if achieved >= requested {
            RunState::Done
        } else {
            RunState::DonePartial
        };
        self.transition(terminal);
        terminal
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "Run state changed");
            self.state = next;
        }
    }
}

/// Cancels `token` on Ctrl+C or SIGTERM. Returns early if the token is
/// cancelled by someone else.
pub async fn cancel_on_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
        () = token.cancelled() => return,
    }

    token.cancel();
}
