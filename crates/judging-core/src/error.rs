//! Error taxonomy for judging batches.

use judging_state::{AwardId, StorageError};

/// Errors that abort a judging batch.
///
/// Precondition failures are raised before any mutation; storage failures
/// come from batch-level reads or an unavailable backend. Per-entry
/// failures never surface here, they are logged and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum JudgingError {
    #[error("no active judges available")]
    NoJudgesAvailable,

    #[error("award not found: {0}")]
    AwardNotFound(AwardId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for judging operations.
pub type Result<T> = std::result::Result<T, JudgingError>;
