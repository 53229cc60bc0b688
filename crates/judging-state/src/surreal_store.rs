//! SurrealDB-backed JudgingStore implementation
//!
//! Uses the `schema` row types for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::error::{Api, Db};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{AssignmentRow, AwardRow, EntryRow, JudgeRow, OrganisationRow, ScoreRow};
use crate::storage_traits::{
    score_aggregates, Assignment, AssignmentId, AssignmentOutcome, Award, AwardId, Entry,
    EntryDetail, EntryFetchOrder, EntryId, EntryQuery, EntryStatus, Judge, JudgingStore,
    Organisation, OrganisationId, Score, StorageResult,
};

/// Transport and connection failures mean the backend is gone for the rest
/// of the batch; everything else failed only the one operation.
fn backend(e: surrealdb::Error) -> StorageError {
    match e {
        surrealdb::Error::Api(
            err @ (Api::Http(_) | Api::Ws(_) | Api::ConnectionUninitialised),
        ) => StorageError::Unavailable(err.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

/// The record id or the unique pair index already holds this row.
fn is_duplicate(e: &surrealdb::Error) -> bool {
    matches!(
        e,
        surrealdb::Error::Db(Db::RecordExists { .. } | Db::IndexExists { .. })
    )
}

/// SurrealDB-backed implementation of [`JudgingStore`].
#[derive(Clone)]
pub struct SurrealJudgingStore {
    db: Surreal<Any>,
}

impl SurrealJudgingStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_url("mem://").await?;
        info!("SurrealJudgingStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables; see [`handle::connect_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_entry(&self, entry_id: &EntryId) -> StorageResult<Option<EntryRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM entries WHERE entry_id = $eid")
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<EntryRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn require_entry(&self, entry_id: &EntryId) -> StorageResult<EntryRow> {
        self.fetch_entry(entry_id)
            .await?
            .ok_or_else(|| StorageError::EntryNotFound {
                entry_id: entry_id.0.clone(),
            })
    }

    async fn fetch_organisation(&self, id: &OrganisationId) -> StorageResult<Option<Organisation>> {
        let mut res = self
            .db
            .query("SELECT * FROM organisations WHERE organisation_id = $oid")
            .bind(("oid", id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<OrganisationRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(Organisation::from))
    }

    async fn fetch_scores(&self, entry_id: &EntryId) -> StorageResult<Vec<Score>> {
        let mut res = self
            .db
            .query("SELECT * FROM scores WHERE entry_id = $eid")
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<ScoreRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(ScoreRow::into_score).collect()
    }

    async fn find_assignment(
        &self,
        judge_email: &str,
        entry_id: &EntryId,
    ) -> StorageResult<Option<AssignmentRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM assignments WHERE judge_email = $judge AND entry_id = $eid")
            .bind(("judge", judge_email.to_string()))
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<AssignmentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn detail(&self, row: EntryRow) -> StorageResult<EntryDetail> {
        let entry = row.into_entry()?;
        let organisation = self
            .fetch_organisation(&entry.organisation_id)
            .await?
            .ok_or_else(|| StorageError::OrganisationNotFound {
                organisation_id: entry.organisation_id.0.clone(),
            })?;
        let award = self
            .get_award(&entry.award_id)
            .await?
            .ok_or_else(|| StorageError::AwardNotFound {
                award_id: entry.award_id.0.clone(),
            })?;
        let scores = self.fetch_scores(&entry.id).await?;
        Ok(EntryDetail {
            entry,
            organisation,
            award,
            scores,
        })
    }

    fn entries_sql(query: &EntryQuery) -> String {
        let mut conditions = Vec::new();
        if query.status.is_some() {
            conditions.push("status = $status");
        }
        if query.award_id.is_some() {
            conditions.push("award_id = $award");
        }
        if query.require_average {
            conditions.push("average_score != NONE AND average_score != NULL");
        }

        let mut sql = String::from("SELECT * FROM entries");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        match query.order {
            EntryFetchOrder::Retrieval => {}
            EntryFetchOrder::SubmittedAt => sql.push_str(" ORDER BY submitted_at ASC"),
            EntryFetchOrder::AverageScoreDesc => sql.push_str(" ORDER BY average_score DESC"),
        }
        sql
    }
}

#[async_trait]
impl JudgingStore for SurrealJudgingStore {
    async fn put_judge(&self, judge: Judge) -> StorageResult<()> {
        let key = judge.email.clone();
        self.db
            .query("UPSERT type::thing('judges', $key) CONTENT $row")
            .bind(("key", key))
            .bind(("row", JudgeRow::from(judge)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn put_organisation(&self, organisation: Organisation) -> StorageResult<()> {
        let key = organisation.id.0.clone();
        self.db
            .query("UPSERT type::thing('organisations', $key) CONTENT $row")
            .bind(("key", key))
            .bind(("row", OrganisationRow::from(organisation)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn put_award(&self, award: Award) -> StorageResult<()> {
        let key = award.id.0.clone();
        self.db
            .query("UPSERT type::thing('awards', $key) CONTENT $row")
            .bind(("key", key))
            .bind(("row", AwardRow::from(award)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn put_entry(&self, entry: Entry) -> StorageResult<()> {
        if self.fetch_organisation(&entry.organisation_id).await?.is_none() {
            return Err(StorageError::OrganisationNotFound {
                organisation_id: entry.organisation_id.0.clone(),
            });
        }
        if self.get_award(&entry.award_id).await?.is_none() {
            return Err(StorageError::AwardNotFound {
                award_id: entry.award_id.0.clone(),
            });
        }

        let key = entry.id.0.clone();
        self.db
            .query("UPSERT type::thing('entries', $key) CONTENT $row")
            .bind(("key", key))
            .bind(("row", EntryRow::from(entry)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn record_score(&self, score: Score) -> StorageResult<()> {
        let entry_id = score.entry_id.clone();
        self.require_entry(&entry_id).await?;

        let key = AssignmentId::for_pair(&score.judge_email, &entry_id)
            .as_str()
            .to_string();
        let judge = score.judge_email.clone();
        let completed = score.completed;

        debug!(entry_id = %entry_id, judge = %judge, "recording score");

        self.db
            .query("UPSERT type::thing('scores', $key) CONTENT $row")
            .bind(("key", key))
            .bind(("row", ScoreRow::from(score)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        if completed {
            self.db
                .query(
                    "UPDATE assignments SET completed = true \
                     WHERE judge_email = $judge AND entry_id = $eid",
                )
                .bind(("judge", judge))
                .bind(("eid", entry_id.0.clone()))
                .await
                .map_err(backend)?
                .check()
                .map_err(backend)?;
        }

        let scores = self.fetch_scores(&entry_id).await?;
        let (average, count) = score_aggregates(scores.iter());
        self.db
            .query(
                "UPDATE entries SET average_score = $avg, completed_score_count = $count \
                 WHERE entry_id = $eid",
            )
            .bind(("avg", average))
            .bind(("count", count))
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn list_active_judges(&self) -> StorageResult<Vec<Judge>> {
        let mut res = self
            .db
            .query("SELECT * FROM judges WHERE active = true")
            .await
            .map_err(backend)?;
        let rows: Vec<JudgeRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(Judge::from).collect())
    }

    async fn list_entries(&self, query: &EntryQuery) -> StorageResult<Vec<EntryDetail>> {
        let sql = Self::entries_sql(query);
        let status = query.status.map(|s| s.as_str().to_string()).unwrap_or_default();
        let award = query
            .award_id
            .as_ref()
            .map(|a| a.0.clone())
            .unwrap_or_default();

        let mut res = self
            .db
            .query(sql)
            .bind(("status", status))
            .bind(("award", award))
            .await
            .map_err(backend)?;
        let rows: Vec<EntryRow> = res.take(0).map_err(backend)?;

        let mut details = Vec::with_capacity(rows.len());
        for row in rows {
            details.push(self.detail(row).await?);
        }
        Ok(details)
    }

    async fn get_award(&self, award_id: &AwardId) -> StorageResult<Option<Award>> {
        let mut res = self
            .db
            .query("SELECT * FROM awards WHERE award_id = $aid")
            .bind(("aid", award_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<AwardRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(Award::from))
    }

    async fn list_active_awards(&self) -> StorageResult<Vec<Award>> {
        let mut res = self
            .db
            .query("SELECT * FROM awards WHERE active = true")
            .await
            .map_err(backend)?;
        let rows: Vec<AwardRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(Award::from).collect())
    }

    async fn assignments_for_entry(&self, entry_id: &EntryId) -> StorageResult<Vec<Assignment>> {
        let mut res = self
            .db
            .query("SELECT * FROM assignments WHERE entry_id = $eid ORDER BY assigned_at ASC")
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<AssignmentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(Assignment::from).collect())
    }

    async fn create_assignment(
        &self,
        judge_email: &str,
        entry_id: &EntryId,
        assigned_at: DateTime<Utc>,
    ) -> StorageResult<AssignmentOutcome> {
        self.require_entry(entry_id).await?;
        if self.find_assignment(judge_email, entry_id).await?.is_some() {
            return Ok(AssignmentOutcome::AlreadyExists);
        }

        let assignment = Assignment::new(judge_email, entry_id, assigned_at);
        let result = self
            .db
            .query("CREATE type::thing('assignments', $key) CONTENT $row")
            .bind(("key", assignment.id.as_str().to_string()))
            .bind(("row", AssignmentRow::from(&assignment)))
            .await
            .map_err(backend)?
            .check();

        match result {
            Ok(_) => {
                debug!(
                    assignment = %assignment.id.short(),
                    entry_id = %entry_id,
                    "assignment created"
                );
                Ok(AssignmentOutcome::Created(assignment))
            }
            // Lost a race with a concurrent batch
            Err(e) if is_duplicate(&e) => Ok(AssignmentOutcome::AlreadyExists),
            Err(e) => Err(backend(e)),
        }
    }

    async fn mark_shortlisted(
        &self,
        entry_id: &EntryId,
        at: DateTime<Utc>,
    ) -> StorageResult<Entry> {
        let mut res = self
            .db
            .query(
                "UPDATE entries \
                 SET status = 'shortlisted', shortlisted = true, shortlisted_at = $at \
                 WHERE entry_id = $eid AND status = 'submitted' RETURN AFTER",
            )
            .bind(("at", SurrealDatetime::from(at)))
            .bind(("eid", entry_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<EntryRow> = res.take(0).map_err(backend)?;

        if let Some(row) = rows.into_iter().next() {
            return row.into_entry();
        }

        let current = self.require_entry(entry_id).await?;
        Err(StorageError::InvalidTransition {
            entry_id: entry_id.0.clone(),
            status: current.status,
            expected: EntryStatus::Submitted.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_sql_includes_only_requested_filters() {
        let sql = SurrealJudgingStore::entries_sql(&EntryQuery::default());
        assert_eq!(sql, "SELECT * FROM entries");

        let q = EntryQuery::submitted()
            .for_award(Some(&AwardId::new("a1")))
            .with_average()
            .ordered_by(EntryFetchOrder::AverageScoreDesc);
        let sql = SurrealJudgingStore::entries_sql(&q);
        assert!(sql.contains("status = $status"));
        assert!(sql.contains("award_id = $award"));
        assert!(sql.contains("average_score != NONE"));
        assert!(sql.ends_with("ORDER BY average_score DESC"));
    }

    #[test]
    fn transport_errors_are_fatal() {
        let err = backend(surrealdb::Error::Api(Api::Ws("connection reset".into())));
        assert!(
            matches!(err, StorageError::Unavailable(ref msg) if msg.contains("connection reset"))
        );
        assert!(backend(surrealdb::Error::Api(Api::Http("502".into()))).is_fatal());
        assert!(backend(surrealdb::Error::Api(Api::ConnectionUninitialised)).is_fatal());
    }

    #[test]
    fn query_errors_fail_one_operation() {
        let err = backend(surrealdb::Error::Api(Api::Query("bad field".into())));
        assert!(matches!(err, StorageError::Backend(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn duplicate_record_is_recognised_by_error_kind() {
        let store = SurrealJudgingStore::in_memory().await.unwrap();
        let sql = "CREATE type::thing('assignments', 'pair-1') \
                   CONTENT { judge_email: 'j1@example.org', entry_id: 'entry-1' }";

        store.db.query(sql).await.unwrap().check().unwrap();
        let err = store.db.query(sql).await.unwrap().check().unwrap_err();
        assert!(is_duplicate(&err), "unexpected error: {err}");

        let other = store
            .db
            .query("THROW 'boom'")
            .await
            .unwrap()
            .check()
            .unwrap_err();
        assert!(!is_duplicate(&other));
    }
}
