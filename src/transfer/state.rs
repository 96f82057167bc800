//! Transfer State Definitions
//!
//! ```text
//! VALIDATING → LOCK_ACQUIRED → BALANCE_CHECKED → COMMITTED → EVENT_PUBLISHED
//!      ↓              ↓               ↓               ↓
//!   ABORTED        ABORTED         ABORTED      PUBLISH_FAILED
//! ```
//!
//! Nothing is persisted before COMMITTED, so every ABORTED edge leaves the store
//! untouched.

use std::fmt;

use super::error::TransferError;

/// Per-call transfer states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Input checks running, no store access yet
    Validating,

    /// Both row locks held inside the unit-of-work
    LockAcquired,

    /// Source balance re-read under lock and found sufficient
    BalanceChecked,

    /// Unit-of-work committed: balances moved and record written
    Committed,

    /// Terminal: notification delivered
    EventPublished,

    /// Terminal: notification not delivered (transfer still committed)
    PublishFailed,

    /// Terminal: unit-of-work rolled back, nothing persisted
    Aborted,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::EventPublished | TransferState::PublishFailed | TransferState::Aborted
        )
    }

    /// Whether the transfer is durably applied in this state
    #[inline]
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            TransferState::Committed | TransferState::EventPublished | TransferState::PublishFailed
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Validating, LockAcquired)
                | (LockAcquired, BalanceChecked)
                | (BalanceChecked, Committed)
                | (Committed, EventPublished)
                | (Committed, PublishFailed)
                | (Validating, Aborted)
                | (LockAcquired, Aborted)
                | (BalanceChecked, Aborted)
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Validating => "VALIDATING",
            TransferState::LockAcquired => "LOCK_ACQUIRED",
            TransferState::BalanceChecked => "BALANCE_CHECKED",
            TransferState::Committed => "COMMITTED",
            TransferState::EventPublished => "EVENT_PUBLISHED",
            TransferState::PublishFailed => "PUBLISH_FAILED",
            TransferState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one transfer call through the state machine.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    state: TransferState,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self {
            state: TransferState::Validating,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn advance(&mut self, next: TransferState) -> Result<TransferState, TransferError> {
        if !self.state.can_transition_to(next) {
            return Err(TransferError::Internal(format!(
                "Invalid state transition: {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Transfer state transition");
        self.state = next;
        Ok(next)
    }

    /// Record an abort. A no-op once committed: a committed transfer cannot abort.
    pub fn abort(&mut self) {
        if self.state.can_transition_to(TransferState::Aborted) {
            tracing::debug!(from = %self.state, "Transfer aborted");
            self.state = TransferState::Aborted;
        }
    }
}

impl Default for TransferProgress {
    fn default() -> Self {
        Self::new()
    }
}
