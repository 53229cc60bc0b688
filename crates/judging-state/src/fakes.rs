//! In-memory fake for `JudgingStore` (testing only)
//!
//! `MemoryJudgingStore` satisfies the trait contract without any external
//! dependencies. Records keep insertion order, which is the "retrieval
//! order" the core sees. Writes for chosen entries can be made to fail, or
//! the whole backend made to look unreachable from a chosen entry on, so
//! partial-batch and fatal-batch behaviour can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    judges: Vec<Judge>,
    organisations: Vec<Organisation>,
    awards: Vec<Award>,
    entries: Vec<Entry>,
    assignments: Vec<Assignment>,
    scores: Vec<Score>,
}

impl Tables {
    fn organisation(&self, id: &OrganisationId) -> Option<&Organisation> {
        self.organisations.iter().find(|o| o.id == *id)
    }

    fn award(&self, id: &AwardId) -> Option<&Award> {
        self.awards.iter().find(|a| a.id == *id)
    }

    fn detail(&self, entry: &Entry) -> StorageResult<EntryDetail> {
        let organisation = self
            .organisation(&entry.organisation_id)
            .cloned()
            .ok_or_else(|| StorageError::OrganisationNotFound {
                organisation_id: entry.organisation_id.0.clone(),
            })?;
        let award = self
            .award(&entry.award_id)
            .cloned()
            .ok_or_else(|| StorageError::AwardNotFound {
                award_id: entry.award_id.0.clone(),
            })?;
        let scores = self
            .scores
            .iter()
            .filter(|s| s.entry_id == entry.id)
            .cloned()
            .collect();
        Ok(EntryDetail {
            entry: entry.clone(),
            organisation,
            award,
            scores,
        })
    }
}

fn upsert<T>(rows: &mut Vec<T>, row: T, same: impl Fn(&T) -> bool) {
    match rows.iter_mut().find(|r| same(r)) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

/// In-memory judging store backed by insertion-ordered vectors.
#[derive(Debug, Default)]
pub struct MemoryJudgingStore {
    tables: Mutex<Tables>,
    failing_entries: Mutex<HashSet<EntryId>>,
    unreachable_from: Mutex<Option<EntryId>>,
    unreachable: Mutex<bool>,
}

impl MemoryJudgingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every per-entry write (assignment creation, shortlisting) for
    /// `entry_id` fail with `StorageError::Backend`.
    pub fn fail_writes_for(&self, entry_id: &EntryId) {
        self.failing_entries.lock().unwrap().insert(entry_id.clone());
    }

    /// Simulate the connection dropping: the first per-entry call touching
    /// `entry_id`, and every per-entry call after it, fails with
    /// `StorageError::Unavailable`.
    pub fn drop_connection_at(&self, entry_id: &EntryId) {
        *self.unreachable_from.lock().unwrap() = Some(entry_id.clone());
    }

    /// Snapshot of every stored assignment, in creation order.
    pub fn all_assignments(&self) -> Vec<Assignment> {
        self.tables.lock().unwrap().assignments.clone()
    }

    /// Look up a single entry by id.
    pub fn entry(&self, entry_id: &EntryId) -> Option<Entry> {
        self.tables
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == *entry_id)
            .cloned()
    }

    fn check_reachable(&self, entry_id: &EntryId) -> StorageResult<()> {
        let mut unreachable = self.unreachable.lock().unwrap();
        if self.unreachable_from.lock().unwrap().as_ref() == Some(entry_id) {
            *unreachable = true;
        }
        if *unreachable {
            return Err(StorageError::Unavailable(format!(
                "injected connection loss at entry {entry_id}"
            )));
        }
        Ok(())
    }

    fn check_writable(&self, entry_id: &EntryId) -> StorageResult<()> {
        self.check_reachable(entry_id)?;
        if self.failing_entries.lock().unwrap().contains(entry_id) {
            return Err(StorageError::Backend(format!(
                "injected write failure for entry {entry_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JudgingStore for MemoryJudgingStore {
    async fn put_judge(&self, judge: Judge) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let email = judge.email.clone();
        upsert(&mut tables.judges, judge, |j| j.email == email);
        Ok(())
    }

    async fn put_organisation(&self, organisation: Organisation) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let id = organisation.id.clone();
        upsert(&mut tables.organisations, organisation, |o| o.id == id);
        Ok(())
    }

    async fn put_award(&self, award: Award) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let id = award.id.clone();
        upsert(&mut tables.awards, award, |a| a.id == id);
        Ok(())
    }

    async fn put_entry(&self, entry: Entry) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.organisation(&entry.organisation_id).is_none() {
            return Err(StorageError::OrganisationNotFound {
                organisation_id: entry.organisation_id.0.clone(),
            });
        }
        if tables.award(&entry.award_id).is_none() {
            return Err(StorageError::AwardNotFound {
                award_id: entry.award_id.0.clone(),
            });
        }
        let id = entry.id.clone();
        upsert(&mut tables.entries, entry, |e| e.id == id);
        Ok(())
    }

    async fn record_score(&self, score: Score) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let entry_id = score.entry_id.clone();
        if !tables.entries.iter().any(|e| e.id == entry_id) {
            return Err(StorageError::EntryNotFound {
                entry_id: entry_id.0.clone(),
            });
        }

        let judge = score.judge_email.clone();
        let completed = score.completed;
        upsert(&mut tables.scores, score, |s| {
            s.judge_email == judge && s.entry_id == entry_id
        });

        if completed {
            if let Some(a) = tables
                .assignments
                .iter_mut()
                .find(|a| a.judge_email == judge && a.entry_id == entry_id)
            {
                a.completed = true;
            }
        }

        let (average, count) =
            score_aggregates(tables.scores.iter().filter(|s| s.entry_id == entry_id));
        if let Some(entry) = tables.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.average_score = average;
            entry.completed_score_count = count;
        }
        Ok(())
    }

    async fn list_active_judges(&self) -> StorageResult<Vec<Judge>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.judges.iter().filter(|j| j.active).cloned().collect())
    }

    async fn list_entries(&self, query: &EntryQuery) -> StorageResult<Vec<EntryDetail>> {
        let tables = self.tables.lock().unwrap();
        let mut details = tables
            .entries
            .iter()
            .filter(|e| query.matches(e))
            .map(|e| tables.detail(e))
            .collect::<StorageResult<Vec<_>>>()?;

        match query.order {
            EntryFetchOrder::Retrieval => {}
            EntryFetchOrder::SubmittedAt => {
                details.sort_by_key(|d| d.entry.submitted_at);
            }
            EntryFetchOrder::AverageScoreDesc => {
                details.sort_by(|a, b| {
                    let a = a.entry.average_score.unwrap_or(f64::NEG_INFINITY);
                    let b = b.entry.average_score.unwrap_or(f64::NEG_INFINITY);
                    b.total_cmp(&a)
                });
            }
        }
        Ok(details)
    }

    async fn get_award(&self, award_id: &AwardId) -> StorageResult<Option<Award>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.award(award_id).cloned())
    }

    async fn list_active_awards(&self) -> StorageResult<Vec<Award>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.awards.iter().filter(|a| a.active).cloned().collect())
    }

    async fn assignments_for_entry(&self, entry_id: &EntryId) -> StorageResult<Vec<Assignment>> {
        self.check_reachable(entry_id)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .assignments
            .iter()
            .filter(|a| a.entry_id == *entry_id)
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &self,
        judge_email: &str,
        entry_id: &EntryId,
        assigned_at: DateTime<Utc>,
    ) -> StorageResult<AssignmentOutcome> {
        self.check_writable(entry_id)?;
        let mut tables = self.tables.lock().unwrap();
        if !tables.entries.iter().any(|e| e.id == *entry_id) {
            return Err(StorageError::EntryNotFound {
                entry_id: entry_id.0.clone(),
            });
        }

        let assignment = Assignment::new(judge_email, entry_id, assigned_at);
        if tables.assignments.iter().any(|a| a.id == assignment.id) {
            return Ok(AssignmentOutcome::AlreadyExists);
        }
        tables.assignments.push(assignment.clone());
        Ok(AssignmentOutcome::Created(assignment))
    }

    async fn mark_shortlisted(
        &self,
        entry_id: &EntryId,
        at: DateTime<Utc>,
    ) -> StorageResult<Entry> {
        self.check_writable(entry_id)?;
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .entries
            .iter_mut()
            .find(|e| e.id == *entry_id)
            .ok_or_else(|| StorageError::EntryNotFound {
                entry_id: entry_id.0.clone(),
            })?;
        if entry.status != EntryStatus::Submitted {
            return Err(StorageError::InvalidTransition {
                entry_id: entry_id.0.clone(),
                status: entry.status.to_string(),
                expected: EntryStatus::Submitted.to_string(),
            });
        }
        entry.status = EntryStatus::Shortlisted;
        entry.shortlisted = true;
        entry.shortlisted_at = Some(at);
        Ok(entry.clone())
    }
}

/// Count assignments per (judge, entry) pair; handy for uniqueness checks.
pub fn assignment_pair_counts(assignments: &[Assignment]) -> HashMap<(String, EntryId), usize> {
    let mut counts = HashMap::new();
    for a in assignments {
        *counts
            .entry((a.judge_email.clone(), a.entry_id.clone()))
            .or_insert(0) += 1;
    }
    counts
}
