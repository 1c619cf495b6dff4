//! # Session Status
//!
//! The forward path has no branches and no skips. Cancellation and failure
//! are exits, not states a session can leave.

use satp_core::{ErrorTag, SatpError, Timestamp};
use serde::{Deserialize, Serialize};

/// Position of a session in the transfer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    New,
    Initiated,
    Locked,
    CommitPrepared,
    Committed,
    Completed,
    RolledBack,
    Failed,
}

impl SessionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Initiated => "INITIATED",
            Self::Locked => "LOCKED",
            Self::CommitPrepared => "COMMIT_PREPARED",
            Self::Committed => "COMMITTED",
            Self::Completed => "COMPLETED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack | Self::Failed)
    }

    /// The next state on the forward path, if any.
    pub fn successor(&self) -> Option<SessionStatus> {
        match self {
            Self::New => Some(Self::Initiated),
            Self::Initiated => Some(Self::Locked),
            Self::Locked => Some(Self::CommitPrepared),
            Self::CommitPrepared => Some(Self::Committed),
            Self::Committed => Some(Self::Completed),
            Self::Completed | Self::RolledBack | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(to, Self::RolledBack | Self::Failed) || self.successor() == Some(to)
    }

    /// Checks the transition and returns the record to append.
    pub fn transition(
        &self,
        to: SessionStatus,
        reason: Option<String>,
        tag: &ErrorTag,
    ) -> Result<TransitionRecord, SatpError> {
        if !self.can_transition_to(to) {
            return Err(SatpError::InvalidTransition {
                tag: tag.clone(),
                from: self.name().to_string(),
                to: to.name().to_string(),
            });
        }
        Ok(TransitionRecord {
            from_state: *self,
            to_state: to,
            timestamp: Timestamp::now(),
            reason,
        })
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One accepted status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_state: SessionStatus,
    pub to_state: SessionStatus,
    pub timestamp: Timestamp,
    pub reason: Option<String>,
}
