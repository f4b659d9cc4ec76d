//! Crate-level error taxonomy for IMFLOW.

use imflow_state::StorageError;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::scoring::ScoringError;
use crate::workflow::WorkflowError;

/// Any failure surfaced by the workflow core.
#[derive(Debug, thiserror::Error)]
pub enum ImflowError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ImflowError {
    /// Validation errors block submission; everything else is an action
    /// failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Scoring(_))
    }

    /// One-line message for the person who triggered the action.
    pub fn user_message(&self) -> String {
        if self.is_validation() {
            format!("cannot submit: {self}")
        } else {
            format!("action failed: {self}")
        }
    }
}

/// Result type for IMFLOW operations.
pub type Result<T> = std::result::Result<T, ImflowError>;
