//! SurrealDB schema initialization
//!
//! Defines the judging tables with their indexes. The unique index on
//! `assignments (judge_email, entry_id)` is what keeps concurrent batches
//! from double-assigning a judge.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all judging tables. Safe to call multiple times.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing judging SurrealDB schema");

    init_reference_tables(db).await?;
    init_entries_table(db).await?;
    init_assignments_table(db).await?;
    init_scores_table(db).await?;

    info!("Judging schema initialization complete");
    Ok(())
}

/// Run one block of DDL, reporting any failure as a schema setup error.
async fn apply(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// `judges`, `organisations`, `awards`: keyed reference data.
async fn init_reference_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing reference tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS judges SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_judge_email ON TABLE judges COLUMNS email UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_judge_active ON TABLE judges COLUMNS active;

        DEFINE TABLE IF NOT EXISTS organisations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_organisation_id ON TABLE organisations
            COLUMNS organisation_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS awards SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_award_id ON TABLE awards COLUMNS award_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_award_active ON TABLE awards COLUMNS active;
    "#;

    apply(db, sql).await
}

/// `entries`
///
/// Constraints:
/// - `entry_id` is unique
/// - `status` transitions submitted → shortlisted only via `mark_shortlisted`
async fn init_entries_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing entries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS entries SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_entry_id ON TABLE entries COLUMNS entry_id UNIQUE;

        -- Batch selection: status + award, then ordering columns
        DEFINE INDEX IF NOT EXISTS idx_entry_status_award ON TABLE entries COLUMNS status, award_id;
        DEFINE INDEX IF NOT EXISTS idx_entry_submitted_at ON TABLE entries COLUMNS submitted_at;
    "#;

    apply(db, sql).await
}

/// `assignments`
///
/// Constraints:
/// - `(judge_email, entry_id)` is unique
/// - record id is `assignments:<sha256(judge, entry)>`
async fn init_assignments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing assignments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS assignments SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_assignment_pair ON TABLE assignments
            COLUMNS judge_email, entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_assignment_entry ON TABLE assignments COLUMNS entry_id;
    "#;

    apply(db, sql).await
}

/// `scores`: one row per (judge, entry), overwritten on re-score.
async fn init_scores_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing scores table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS scores SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_score_pair ON TABLE scores
            COLUMNS judge_email, entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_score_entry ON TABLE scores COLUMNS entry_id;
    "#;

    apply(db, sql).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle;

    #[tokio::test]
    async fn schema_applies_on_a_fresh_database_and_reapplies() {
        let db = handle::connect_url("mem://").await.unwrap();
        init_schema(&db).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_ddl_is_a_schema_setup_error() {
        let db = handle::connect_url("mem://").await.unwrap();
        let err = apply(&db, "DEFINE TABLE broken PERMISSIONS FOR read FULL;")
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::SchemaSetup(_)));
    }
}
