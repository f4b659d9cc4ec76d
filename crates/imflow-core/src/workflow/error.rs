//! Error types for the workflow state machine.

use super::status::{Stage, WorkflowStatus};

/// Errors produced when asking for the next status of an IM.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// The `(status, stage, outcome)` triple is not in the transition table.
    #[error("illegal transition: stage {stage} cannot apply '{outcome}' to an IM in '{from}'")]
    IllegalTransition {
        from: WorkflowStatus,
        stage: Stage,
        outcome: String,
    },

    /// The UTLDO approval gate was not satisfied in this session.
    #[error("approval requires the recommendation letter to be downloaded or acknowledged first")]
    ApprovalRequired,

    #[error("unknown workflow status: '{0}'")]
    UnknownStatus(String),

    #[error("unknown review stage: '{0}'")]
    UnknownStage(String),

    #[error("unknown decision: '{0}'")]
    UnknownDecision(String),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
