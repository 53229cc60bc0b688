//! Error types for judging-state

use thiserror::Error;

/// Errors raised while connecting to or initialising a backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by [`crate::JudgingStore`] operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached at all. Batches treat this as fatal.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed a single operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("entry not found: {entry_id}")]
    EntryNotFound { entry_id: String },

    #[error("organisation not found: {organisation_id}")]
    OrganisationNotFound { organisation_id: String },

    #[error("award not found: {award_id}")]
    AwardNotFound { award_id: String },

    #[error("entry {entry_id} is {status}, expected {expected}")]
    InvalidTransition {
        entry_id: String,
        status: String,
        expected: String,
    },

    /// A stored or imported record failed validation at the boundary.
    #[error("invalid {kind} record: {reason}")]
    InvalidRecord { kind: String, reason: String },
}

impl StorageError {
    /// Whether the error means the whole backend is gone, not just one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }

    pub(crate) fn invalid(kind: &str, reason: impl Into<String>) -> Self {
        StorageError::InvalidRecord {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Connection(msg) => StorageError::Unavailable(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_fatal() {
        assert!(StorageError::Unavailable("down".into()).is_fatal());
        assert!(!StorageError::Backend("write rejected".into()).is_fatal());
        assert!(!StorageError::EntryNotFound {
            entry_id: "e1".into()
        }
        .is_fatal());
    }

    #[test]
    fn connection_state_error_maps_to_unavailable() {
        let err: StorageError = StateError::Connection("refused".into()).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("refused"));
    }
}
