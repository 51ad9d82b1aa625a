//! Mutation lifecycle state machine.
//!
//! ```text
//! Idle -> OptimisticApplied -> SettledSuccess -> Reconciled
//!                          \-> SettledError   -> Reconciled
//! ```
//!
//! `SettledError` only moves to `Reconciled` once the rollback has been
//! written.

use std::fmt;

use tokio::sync::watch;

use crate::error::{CacheError, CacheResult, MutationError};

/// Lifecycle state of one mutation invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationState {
    Idle,
    OptimisticApplied,
    SettledSuccess,
    SettledError,
    Reconciled,
}

impl MutationState {
    pub fn can_transition_to(self, next: MutationState) -> bool {
        matches!(
            (self, next),
            (MutationState::Idle, MutationState::OptimisticApplied)
                | (MutationState::OptimisticApplied, MutationState::SettledSuccess)
                | (MutationState::OptimisticApplied, MutationState::SettledError)
                | (MutationState::SettledSuccess, MutationState::Reconciled)
                | (MutationState::SettledError, MutationState::Reconciled)
        )
    }

    /// True while the server has not answered yet.
    pub fn is_pending(self) -> bool {
        self == MutationState::OptimisticApplied
    }

    pub fn is_terminal(self) -> bool {
        self == MutationState::Reconciled
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationState::Idle => "idle",
            MutationState::OptimisticApplied => "optimistic-applied",
            MutationState::SettledSuccess => "settled-success",
            MutationState::SettledError => "settled-error",
            MutationState::Reconciled => "reconciled",
        };
        f.write_str(s)
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationStatus {
    pub state: MutationState,
    pub error: Option<MutationError>,
}

impl Default for MutationStatus {
    fn default() -> Self {
        Self {
            state: MutationState::Idle,
            error: None,
        }
    }
}

/// Enforces the lifecycle and publishes every transition.
#[derive(Debug)]
pub struct MutationTracker {
    tx: watch::Sender<MutationStatus>,
}

impl MutationTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MutationStatus::default());
        Self { tx }
    }

    pub fn state(&self) -> MutationState {
        self.tx.borrow().state
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow.
    pub fn transition(&self, next: MutationState) -> CacheResult<()> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(CacheError::IllegalTransition { from, to: next });
        }
        self.tx.send_modify(|status| status.state = next);
        Ok(())
    }

    /// Record the error surfaced to the caller.
    pub fn record_error(&self, error: MutationError) {
        self.tx.send_modify(|status| status.error = Some(error));
    }

    pub fn observe(&self) -> MutationObserver {
        MutationObserver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a [`MutationTracker`]: the pending flag and error object a
/// view renders.
#[derive(Debug, Clone)]
pub struct MutationObserver {
    rx: watch::Receiver<MutationStatus>,
}

impl MutationObserver {
    pub fn status(&self) -> MutationStatus {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> MutationState {
        self.rx.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    pub fn error(&self) -> Option<MutationError> {
        self.rx.borrow().error.clone()
    }

    /// Wait for the next transition.
    ///
    /// Returns `false` once the tracker is gone and no further change can
    /// arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
