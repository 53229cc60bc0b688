//! Judging-State: persistence for the awards judging core
//!
//! This crate owns every byte that crosses the storage boundary for judging
//! batches. Backends parse their rows into the typed records defined in
//! `storage_traits` so the core never sees loosely shaped data.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: typed records, idempotent assignment creation, atomic shortlist
//! transitions.
//!
//! ## Key Components
//!
//! - `JudgingStore`: the storage collaborator consumed by the core
//! - `MemoryJudgingStore`: insertion-ordered fake for tests
//! - `SurrealJudgingStore`: SurrealDB backend with a unique
//!   (judge, entry) assignment index
//! - `Dataset`: validated JSON import

pub mod dataset;
mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use dataset::{Dataset, ImportSummary};
pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, DEFAULT_DATABASE, DEFAULT_LOCAL_PATH, DEFAULT_NAMESPACE};
pub use storage_traits::{
    Assignment, AssignmentId, AssignmentOutcome, Award, AwardId, Entry, EntryDetail,
    EntryFetchOrder, EntryId, EntryQuery, EntryStatus, Judge, JudgingStore, Organisation,
    OrganisationId, Recommendation, Score, StorageResult,
};
pub use surreal_store::SurrealJudgingStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
