//! Judge assignment engine.
//!
//! For every submitted entry the engine picks up to `judges_per_entry`
//! judges, skipping anyone already assigned and anyone with a conflict of
//! interest, ranked by expertise. Planning is pure ([`plan_entry`]); the
//! engine then persists the plan and notifies the selected judges.
//!
//! Re-running a batch is safe: assignment creation is create-if-absent at
//! the storage layer and already-assigned judges count towards the target.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use judging_state::{
    Assignment, AssignmentOutcome, AwardId, EntryDetail, EntryId, EntryQuery, Judge,
    JudgingStore, StorageError,
};
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::config::JudgingConfig;
use crate::conflict::{detect_conflict, ConflictReason};
use crate::error::{JudgingError, Result};
use crate::expertise::expertise_score;
use crate::metrics::METRICS;
use crate::notify::{Notifier, NotifyError};
use crate::obs::{self, BatchKind};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedJudge {
    pub judge_email: String,
    pub judge_name: String,
    pub expertise_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictFinding {
    pub judge_email: String,
    #[serde(flatten)]
    pub reason: ConflictReason,
}

/// What the engine intends to do for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPlan {
    pub entry_id: EntryId,
    pub award_id: AwardId,
    pub already_assigned: usize,
    /// Ordered by expertise score, highest first.
    pub selected: Vec<SelectedJudge>,
    /// Every conflicted candidate that was considered.
    pub conflicts: Vec<ConflictFinding>,
}

/// Outcome of [`AssignmentEngine::assign_judges`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentSummary {
    pub batch_id: String,
    /// Assignments created for entries that completed.
    pub assigned: usize,
    /// Conflicted candidates of entries that completed.
    pub conflicts: usize,
    pub total_entries: usize,
    pub total_judges: usize,
    /// Entries ended early by a storage error or a failed notification.
    pub skipped_entries: usize,
    pub notifications_failed: usize,
}

/// Judges that conflict with one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryConflicts {
    pub entry_id: EntryId,
    pub award_id: AwardId,
    pub company_name: String,
    pub conflicts: Vec<ConflictFinding>,
}

/// Plan the assignments for one entry.
///
/// `judges` is the active judge pool in retrieval order; `existing` holds
/// the entry's current assignments. Candidates are the judges not yet
/// assigned. Conflicted candidates are reported and discarded, the rest are
/// stably sorted by expertise and the best are selected to top the entry up
/// to `judges_per_entry`.
pub fn plan_entry(
    detail: &EntryDetail,
    judges: &[Judge],
    existing: &[Assignment],
    config: &JudgingConfig,
) -> EntryPlan {
    let assigned: HashSet<&str> = existing.iter().map(|a| a.judge_email.as_str()).collect();
    let needed = config.judges_per_entry.saturating_sub(assigned.len());

    let mut conflicts = Vec::new();
    let mut eligible = Vec::new();
    for judge in judges.iter().filter(|j| !assigned.contains(j.email.as_str())) {
        if let Some(reason) = detect_conflict(judge, &detail.organisation, config.domain_matching) {
            conflicts.push(ConflictFinding {
                judge_email: judge.email.clone(),
                reason,
            });
            continue;
        }
        let score = expertise_score(
            &judge.expertise_notes,
            &detail.award.category,
            &config.expertise_keywords,
        );
        eligible.push((judge, score));
    }

    // sort_by is stable, ties keep pool order
    eligible.sort_by(|a, b| b.1.cmp(&a.1));

    let selected = eligible
        .into_iter()
        .take(needed)
        .map(|(judge, score)| SelectedJudge {
            judge_email: judge.email.clone(),
            judge_name: judge.name.clone(),
            expertise_score: score,
        })
        .collect();

    EntryPlan {
        entry_id: detail.entry.id.clone(),
        award_id: detail.entry.award_id.clone(),
        already_assigned: assigned.len(),
        selected,
        conflicts,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AssignmentEngine {
    store: Arc<dyn JudgingStore>,
    notifier: Arc<dyn Notifier>,
    config: JudgingConfig,
}

struct Batch {
    judges: Vec<Judge>,
    entries: Vec<EntryDetail>,
}

/// Counts one entry contributes to the summary once it completes.
#[derive(Debug, Default)]
struct EntryTally {
    assigned: usize,
    conflicts: usize,
}

enum EntryOutcome {
    Done(EntryTally),
    Skipped(StorageError),
    NotificationFailed(NotifyError),
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn JudgingStore>,
        notifier: Arc<dyn Notifier>,
        config: JudgingConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &JudgingConfig {
        &self.config
    }

    /// Check preconditions and load the batch inputs. Nothing is written.
    async fn load_batch(&self, award_filter: Option<&AwardId>) -> Result<Batch> {
        if let Some(award_id) = award_filter {
            if self.store.get_award(award_id).await?.is_none() {
                return Err(JudgingError::AwardNotFound(award_id.clone()));
            }
        }

        let judges = self.store.list_active_judges().await?;
        if judges.is_empty() {
            return Err(JudgingError::NoJudgesAvailable);
        }

        let query = EntryQuery::submitted()
            .for_award(award_filter)
            .ordered_by(self.config.entry_order.fetch_order());
        let entries = self.store.list_entries(&query).await?;
        Ok(Batch { judges, entries })
    }

    /// Plan every entry without creating assignments or sending mail.
    pub async fn preview(&self, award_filter: Option<&AwardId>) -> Result<Vec<EntryPlan>> {
        let batch = self.load_batch(award_filter).await?;
        let mut plans = Vec::with_capacity(batch.entries.len());
        for detail in &batch.entries {
            let existing = self.store.assignments_for_entry(&detail.entry.id).await?;
            plans.push(plan_entry(detail, &batch.judges, &existing, &self.config));
        }
        Ok(plans)
    }

    /// Assign judges to every submitted entry, optionally for one award.
    pub async fn assign_judges(&self, award_filter: Option<&AwardId>) -> Result<AssignmentSummary> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let span = obs::batch_span(&batch_id, BatchKind::Assign);
        self.run_batch(batch_id, award_filter).instrument(span).await
    }

    async fn run_batch(
        &self,
        batch_id: String,
        award_filter: Option<&AwardId>,
    ) -> Result<AssignmentSummary> {
        let started = Instant::now();
        let batch = self.load_batch(award_filter).await?;
        obs::emit_batch_started(&batch_id, BatchKind::Assign, batch.entries.len());

        let by_email: HashMap<&str, &Judge> =
            batch.judges.iter().map(|j| (j.email.as_str(), j)).collect();
        let mut summary = AssignmentSummary {
            batch_id,
            assigned: 0,
            conflicts: 0,
            total_entries: batch.entries.len(),
            total_judges: batch.judges.len(),
            skipped_entries: 0,
            notifications_failed: 0,
        };

        for detail in &batch.entries {
            let entry_id = detail.entry.id.as_str();
            match self.assign_entry(detail, &batch.judges, &by_email).await? {
                EntryOutcome::Done(tally) => {
                    summary.assigned += tally.assigned;
                    summary.conflicts += tally.conflicts;
                    METRICS.add_assignments(tally.assigned as u64);
                    METRICS.add_conflicts(tally.conflicts as u64);
                }
                EntryOutcome::Skipped(err) => {
                    obs::emit_entry_skipped(entry_id, &err);
                    METRICS.inc_skipped();
                    summary.skipped_entries += 1;
                }
                EntryOutcome::NotificationFailed(err) => {
                    obs::emit_entry_skipped(entry_id, &err);
                    METRICS.inc_skipped();
                    METRICS.inc_notifications_failed();
                    summary.skipped_entries += 1;
                    summary.notifications_failed += 1;
                }
            }
        }

        obs::emit_batch_finished(
            &summary.batch_id,
            BatchKind::Assign,
            started.elapsed().as_millis() as u64,
            summary.assigned,
            summary.skipped_entries,
        );
        METRICS.flush();
        Ok(summary)
    }

    /// Persist and notify for one entry.
    ///
    /// Fatal storage errors propagate. Any other storage error, or a failed
    /// notification, ends the entry early and its tally is discarded.
    /// Assignments already written for it stay and count towards the target
    /// on the next run.
    async fn assign_entry(
        &self,
        detail: &EntryDetail,
        judges: &[Judge],
        by_email: &HashMap<&str, &Judge>,
    ) -> Result<EntryOutcome> {
        let entry_id = &detail.entry.id;
        let existing = match self.store.assignments_for_entry(entry_id).await {
            Ok(existing) => existing,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => return Ok(EntryOutcome::Skipped(err)),
        };

        let plan = plan_entry(detail, judges, &existing, &self.config);
        let mut tally = EntryTally {
            conflicts: plan.conflicts.len(),
            ..EntryTally::default()
        };
        for finding in &plan.conflicts {
            obs::emit_conflict_detected(entry_id.as_str(), &finding.judge_email, &finding.reason);
        }

        for selected in &plan.selected {
            match self
                .store
                .create_assignment(&selected.judge_email, entry_id, Utc::now())
                .await
            {
                Ok(AssignmentOutcome::Created(_)) => {
                    tally.assigned += 1;
                    obs::emit_assignment_created(
                        entry_id.as_str(),
                        &selected.judge_email,
                        selected.expertise_score,
                    );
                }
                Ok(AssignmentOutcome::AlreadyExists) => {
                    debug!(
                        entry_id = %entry_id,
                        judge_email = %selected.judge_email,
                        "assignment already exists"
                    );
                    continue;
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => return Ok(EntryOutcome::Skipped(err)),
            }

            let Some(judge) = by_email.get(selected.judge_email.as_str()) else {
                continue;
            };
            if let Err(err) = self.notifier.notify_judge_assigned(judge, detail).await {
                obs::emit_notification_failed(&judge.email, &err);
                return Ok(EntryOutcome::NotificationFailed(err));
            }
        }

        Ok(EntryOutcome::Done(tally))
    }

    /// Active judges that conflict with each submitted entry.
    pub async fn conflict_report(
        &self,
        award_filter: Option<&AwardId>,
    ) -> Result<Vec<EntryConflicts>> {
        let batch = self.load_batch(award_filter).await?;
        Ok(batch
            .entries
            .iter()
            .map(|detail| EntryConflicts {
                entry_id: detail.entry.id.clone(),
                award_id: detail.entry.award_id.clone(),
                company_name: detail.organisation.company_name.clone(),
                conflicts: batch
                    .judges
                    .iter()
                    .filter_map(|judge| {
                        detect_conflict(judge, &detail.organisation, self.config.domain_matching)
                            .map(|reason| ConflictFinding {
                                judge_email: judge.email.clone(),
                                reason,
                            })
                    })
                    .collect(),
            })
            .filter(|report| !report.conflicts.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judging_state::{Award, Entry, Organisation};

    fn detail() -> EntryDetail {
        EntryDetail {
            entry: Entry::submitted("entry-1", "org-1", "award-1", Utc::now()),
            organisation: Organisation::new("org-1", "Acme Ltd").with_website("https://acme.com"),
            award: Award::new("award-1", "Retailer of the Year", "Retail"),
            scores: vec![],
        }
    }

    fn emails(plan: &EntryPlan) -> Vec<&str> {
        plan.selected.iter().map(|s| s.judge_email.as_str()).collect()
    }

    #[test]
    fn selects_by_expertise_then_pool_order() {
        let judges = vec![
            Judge::new("a@x.org", "A"),
            Judge::new("b@x.org", "B").with_expertise("retail specialist"),
            Judge::new("c@x.org", "C"),
            Judge::new("d@x.org", "D"),
        ];
        let plan = plan_entry(&detail(), &judges, &[], &JudgingConfig::default());
        assert_eq!(emails(&plan), vec!["b@x.org", "a@x.org", "c@x.org"]);
        assert_eq!(plan.selected[0].expertise_score, 15);
    }

    #[test]
    fn conflicted_judges_are_reported_not_selected() {
        let judges = vec![
            Judge::new("j1@acme.com", "Jo").with_company("Acme"),
            Judge::new("j2@other.org", "Sam"),
        ];
        let plan = plan_entry(&detail(), &judges, &[], &JudgingConfig::default());
        assert_eq!(emails(&plan), vec!["j2@other.org"]);
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].judge_email, "j1@acme.com");
    }

    #[test]
    fn existing_assignments_reduce_the_target() {
        let judges = vec![
            Judge::new("a@x.org", "A"),
            Judge::new("b@x.org", "B"),
            Judge::new("c@x.org", "C"),
        ];
        let existing = vec![
            Assignment::new("a@x.org", &EntryId::new("entry-1"), Utc::now()),
            Assignment::new("b@x.org", &EntryId::new("entry-1"), Utc::now()),
        ];
        let plan = plan_entry(&detail(), &judges, &existing, &JudgingConfig::default());
        assert_eq!(plan.already_assigned, 2);
        assert_eq!(emails(&plan), vec!["c@x.org"]);
    }

    #[test]
    fn over_assigned_entry_saturates_to_zero() {
        let judges = vec![Judge::new("d@x.org", "D")];
        let existing: Vec<_> = ["a@x.org", "b@x.org", "c@x.org", "e@x.org"]
            .iter()
            .map(|e| Assignment::new(e, &EntryId::new("entry-1"), Utc::now()))
            .collect();
        let plan = plan_entry(&detail(), &judges, &existing, &JudgingConfig::default());
        assert!(plan.selected.is_empty());
    }

    #[test]
    fn already_assigned_conflicted_judge_is_not_recounted() {
        let judges = vec![Judge::new("j1@acme.com", "Jo")];
        let existing = vec![Assignment::new("j1@acme.com", &EntryId::new("entry-1"), Utc::now())];
        let plan = plan_entry(&detail(), &judges, &existing, &JudgingConfig::default());
        assert!(plan.conflicts.is_empty());
    }
}
