use serde::Serialize;
use thiserror::Error;

use crate::improvements::models::AcceptanceState;

/// Which user-facing operation an error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Accept,
    Reject,
    Revert,
    Rescore,
    Remove,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Accept => "accept",
            Phase::Reject => "reject",
            Phase::Revert => "revert",
            Phase::Rescore => "rescore",
            Phase::Remove => "remove",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub phase: Phase,
    pub suggestion_id: Option<String>,
    pub retryable: bool,
}

/// Errors raised by the suggestion lifecycle and its collaborators.
#[derive(Debug, Error)]
pub enum ImprovementError {
    #[error("suggestion {id} not found")]
    SuggestionNotFound { id: String, phase: Phase },

    #[error("cannot {phase} suggestion {id} while it is {state}")]
    InvalidTransition {
        id: String,
        phase: Phase,
        state: AcceptanceState,
    },

    #[error("suggestion {id} failed job-alignment validation: {reason}")]
    ValidationRejected { id: String, reason: String },

    #[error("no history snapshot for suggestion {id}")]
    SnapshotMissing { id: String },

    #[error("a rescore is already in progress, please wait")]
    RescoreBusy,

    #[error("change log {phase} failed for {id}: {message}")]
    PersistenceFailed {
        id: String,
        phase: Phase,
        message: String,
    },

    #[error("rescore failed for {id}: {message}")]
    RescoreFailed { id: String, message: String },
}

impl ImprovementError {
    pub fn phase(&self) -> Phase {
        match self {
            ImprovementError::SuggestionNotFound { phase, .. }
            | ImprovementError::InvalidTransition { phase, .. }
            | ImprovementError::PersistenceFailed { phase, .. } => *phase,
            ImprovementError::ValidationRejected { .. } => Phase::Accept,
            ImprovementError::SnapshotMissing { .. } => Phase::Revert,
            ImprovementError::RescoreBusy | ImprovementError::RescoreFailed { .. } => {
                Phase::Rescore
            }
        }
    }

    pub fn suggestion_id(&self) -> Option<&str> {
        match self {
            ImprovementError::SuggestionNotFound { id, .. }
            | ImprovementError::InvalidTransition { id, .. }
            | ImprovementError::ValidationRejected { id, .. }
            | ImprovementError::SnapshotMissing { id }
            | ImprovementError::PersistenceFailed { id, .. }
            | ImprovementError::RescoreFailed { id, .. } => Some(id),
            ImprovementError::RescoreBusy => None,
        }
    }

    /// Whether retrying the same call later can succeed without changing inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ImprovementError::RescoreBusy
                | ImprovementError::PersistenceFailed { .. }
                | ImprovementError::RescoreFailed { .. }
        )
    }

    /// Stage-specific context for callers rendering the failure.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            message: self.to_string(),
            phase: self.phase(),
            suggestion_id: self.suggestion_id().map(str::to_string),
            retryable: self.is_retryable(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ImprovementError::SuggestionNotFound { .. } => "SUGGESTION_NOT_FOUND",
            ImprovementError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ImprovementError::ValidationRejected { .. } => "VALIDATION_REJECTED",
            ImprovementError::SnapshotMissing { .. } => "SNAPSHOT_MISSING",
            ImprovementError::RescoreBusy => "RESCORE_BUSY",
            ImprovementError::PersistenceFailed { .. } => "PERSISTENCE_FAILED",
            ImprovementError::RescoreFailed { .. } => "RESCORE_FAILED",
        }
    }
}
