//! Error types for imflow-state

use thiserror::Error;

/// Errors raised by a persistence collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record with the given id exists.
    #[error("IM record not found: {id}")]
    NotFound { id: String },

    /// The record changed since it was read; the patch was not applied.
    #[error("version conflict on IM {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// No reviewer scope is registered for the user.
    #[error("no reviewer scope for user: {user_id}")]
    UnknownReviewer { user_id: String },

    /// The backend failed for a reason the core cannot interpret.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_mentions_both_versions() {
        let err = StorageError::VersionConflict {
            id: "im-1".into(),
            expected: 3,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("im-1"));
        assert!(msg.contains('3'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn serde_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = bad.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
