//! Entity records and the storage trait for awards judging
//!
//! The entities here are the typed shapes every backend parses its rows
//! into:
//! - `Judge`, `Organisation`, `Award`: read-only reference data
//! - `Entry`: a submission, mutated only by shortlisting
//! - `Assignment`: the judge ↔ entry edge, unique per pair
//! - `Score`: a judge's evaluation of an entry
//!
//! `JudgingStore` is async and backend-agnostic. An in-memory fake is
//! provided in the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of an award entry
    EntryId
);
string_id!(
    /// Identifier of an award category
    AwardId
);
string_id!(
    /// Identifier of an entrant organisation
    OrganisationId
);

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A judge contact. The email address is the judge's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judge {
    pub email: String,
    pub name: String,
    /// Free-text expertise notes, matched against award categories.
    #[serde(default)]
    pub expertise_notes: String,
    /// Declared company affiliation.
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Judge {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            expertise_notes: String::new(),
            company: None,
            active: true,
        }
    }

    pub fn with_expertise(mut self, notes: impl Into<String>) -> Self {
        self.expertise_notes = notes.into();
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// The organisation behind an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: OrganisationId,
    pub company_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Recipient of shortlist notifications.
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl Organisation {
    pub fn new(id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            id: OrganisationId::new(id),
            company_name: company_name.into(),
            website: None,
            contact_name: None,
            contact_email: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_contact(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self.contact_email = Some(email.into());
        self
    }
}

/// An award category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub id: AwardId,
    pub name: String,
    /// Sector/category string used for expertise matching.
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Award {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: AwardId::new(id),
            name: name.into(),
            category: category.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Submission status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Draft,
    Submitted,
    UnderReview,
    Shortlisted,
    Winner,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Submitted => "submitted",
            EntryStatus::UnderReview => "under_review",
            EntryStatus::Shortlisted => "shortlisted",
            EntryStatus::Winner => "winner",
            EntryStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EntryStatus::Draft),
            "submitted" => Ok(EntryStatus::Submitted),
            "under_review" => Ok(EntryStatus::UnderReview),
            "shortlisted" => Ok(EntryStatus::Shortlisted),
            "winner" => Ok(EntryStatus::Winner),
            "rejected" => Ok(EntryStatus::Rejected),
            other => Err(StorageError::invalid(
                "entry",
                format!("unknown status: {other}"),
            )),
        }
    }
}

/// An award entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub organisation_id: OrganisationId,
    pub award_id: AwardId,
    pub status: EntryStatus,
    /// Mean of completed scores, maintained by `record_score`.
    #[serde(default)]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub completed_score_count: u32,
    #[serde(default)]
    pub shortlisted: bool,
    #[serde(default)]
    pub shortlisted_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

impl Entry {
    /// A freshly submitted entry with no scores.
    pub fn submitted(
        id: impl Into<String>,
        organisation_id: impl Into<String>,
        award_id: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(id),
            organisation_id: OrganisationId::new(organisation_id),
            award_id: AwardId::new(award_id),
            status: EntryStatus::Submitted,
            average_score: None,
            completed_score_count: 0,
            shortlisted: false,
            shortlisted_at: None,
            submitted_at,
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }
}

/// An entry together with the related records the core needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    pub entry: Entry,
    pub organisation: Organisation,
    pub award: Award,
    /// All score records for the entry, completed or not.
    pub scores: Vec<Score>,
}

impl EntryDetail {
    /// Iterate over completed scores only.
    pub fn completed_scores(&self) -> impl Iterator<Item = &Score> {
        self.scores.iter().filter(|s| s.completed)
    }
}

/// Ordering applied by `list_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryFetchOrder {
    /// Backend retrieval order (insertion order for the in-memory store).
    #[default]
    Retrieval,
    /// Submission timestamp, oldest first.
    SubmittedAt,
    /// Average score, highest first. Entries without an average sort last.
    AverageScoreDesc,
}

/// Filter for `list_entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub status: Option<EntryStatus>,
    pub award_id: Option<AwardId>,
    /// Only entries with a non-null average score.
    pub require_average: bool,
    pub order: EntryFetchOrder,
}

impl EntryQuery {
    /// All entries in `submitted` status.
    pub fn submitted() -> Self {
        Self {
            status: Some(EntryStatus::Submitted),
            ..Self::default()
        }
    }

    pub fn for_award(mut self, award_id: Option<&AwardId>) -> Self {
        self.award_id = award_id.cloned();
        self
    }

    pub fn with_average(mut self) -> Self {
        self.require_average = true;
        self
    }

    pub fn ordered_by(mut self, order: EntryFetchOrder) -> Self {
        self.order = order;
        self
    }

    /// Whether an entry passes the status/award/average filters.
    pub fn matches(&self, entry: &Entry) -> bool {
        self.status.map(|s| entry.status == s).unwrap_or(true)
            && self
                .award_id
                .as_ref()
                .map(|a| entry.award_id == *a)
                .unwrap_or(true)
            && (!self.require_average || entry.average_score.is_some())
    }
}

// ---------------------------------------------------------------------------
// Assignments and scores
// ---------------------------------------------------------------------------

/// Deterministic assignment identifier: SHA-256 of (judge email, entry id).
///
/// Two attempts to assign the same judge to the same entry always produce
/// the same id, which is what lets backends reject the duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(String);

impl AssignmentId {
    pub fn for_pair(judge_email: &str, entry_id: &EntryId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"J:");
        hasher.update(judge_email.as_bytes());
        hasher.update(b"\0E:");
        hasher.update(entry_id.as_str().as_bytes());
        AssignmentId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A judge's obligation to score an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub judge_email: String,
    pub entry_id: EntryId,
    pub completed: bool,
    pub assigned_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(judge_email: &str, entry_id: &EntryId, assigned_at: DateTime<Utc>) -> Self {
        Self {
            id: AssignmentId::for_pair(judge_email, entry_id),
            judge_email: judge_email.to_string(),
            entry_id: entry_id.clone(),
            completed: false,
            assigned_at,
        }
    }
}

/// Result of a create-if-absent assignment write.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentOutcome {
    Created(Assignment),
    /// The (judge, entry) pair was already assigned; nothing was written.
    AlreadyExists,
}

impl AssignmentOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, AssignmentOutcome::Created(_))
    }
}

/// A judge's recommendation tag on a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Shortlist,
    Maybe,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Shortlist => "shortlist",
            Recommendation::Maybe => "maybe",
            Recommendation::Reject => "reject",
        }
    }
}

impl FromStr for Recommendation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shortlist" => Ok(Recommendation::Shortlist),
            "maybe" => Ok(Recommendation::Maybe),
            "reject" => Ok(Recommendation::Reject),
            other => Err(StorageError::invalid(
                "score",
                format!("unknown recommendation: {other}"),
            )),
        }
    }
}

/// A judge's evaluation of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub judge_email: String,
    pub entry_id: EntryId,
    pub total_score: f64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

impl Score {
    /// A completed score with no recommendation.
    pub fn completed(judge_email: impl Into<String>, entry_id: &EntryId, total_score: f64) -> Self {
        Self {
            judge_email: judge_email.into(),
            entry_id: entry_id.clone(),
            total_score,
            completed: true,
            recommendation: None,
        }
    }

    pub fn recommending(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }

    pub fn in_progress(mut self) -> Self {
        self.completed = false;
        self
    }
}

/// Mean and count of completed scores, as stored on the entry.
pub(crate) fn score_aggregates<'a>(
    scores: impl Iterator<Item = &'a Score>,
) -> (Option<f64>, u32) {
    let (sum, count) = scores
        .filter(|s| s.completed)
        .fold((0.0_f64, 0_u32), |(sum, n), s| (sum + s.total_score, n + 1));
    if count == 0 {
        (None, 0)
    } else {
        (Some(sum / f64::from(count)), count)
    }
}

// ---------------------------------------------------------------------------
// JudgingStore
// ---------------------------------------------------------------------------

/// Storage collaborator for the judging core.
///
/// Guarantees:
/// - `create_assignment` never stores two assignments for one
///   (judge, entry) pair; the second attempt reports `AlreadyExists`.
/// - `mark_shortlisted` sets status, flag and timestamp in one update and
///   only from `submitted`.
/// - `record_score` keeps `Entry::average_score` and
///   `Entry::completed_score_count` consistent with completed scores.
#[async_trait]
pub trait JudgingStore: Send + Sync {
    /// Insert or replace a judge, keyed by email.
    async fn put_judge(&self, judge: Judge) -> StorageResult<()>;

    /// Insert or replace an organisation.
    async fn put_organisation(&self, organisation: Organisation) -> StorageResult<()>;

    /// Insert or replace an award.
    async fn put_award(&self, award: Award) -> StorageResult<()>;

    /// Insert or replace an entry. Its organisation and award must exist.
    async fn put_entry(&self, entry: Entry) -> StorageResult<()>;

    /// Record (or overwrite) a judge's score, mark the matching assignment
    /// completed, and refresh the entry's aggregates.
    async fn record_score(&self, score: Score) -> StorageResult<()>;

    /// Active judges in retrieval order.
    async fn list_active_judges(&self) -> StorageResult<Vec<Judge>>;

    /// Entries matching `query`, with organisation, award and scores.
    async fn list_entries(&self, query: &EntryQuery) -> StorageResult<Vec<EntryDetail>>;

    async fn get_award(&self, award_id: &AwardId) -> StorageResult<Option<Award>>;

    async fn list_active_awards(&self) -> StorageResult<Vec<Award>>;

    /// Existing assignments for one entry.
    async fn assignments_for_entry(&self, entry_id: &EntryId) -> StorageResult<Vec<Assignment>>;

    /// Create the (judge, entry) assignment if it does not exist yet.
    async fn create_assignment(
        &self,
        judge_email: &str,
        entry_id: &EntryId,
        assigned_at: DateTime<Utc>,
    ) -> StorageResult<AssignmentOutcome>;

    /// Transition an entry from `submitted` to `shortlisted`.
    async fn mark_shortlisted(&self, entry_id: &EntryId, at: DateTime<Utc>) -> StorageResult<Entry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_id_is_deterministic_per_pair() {
        let e1 = EntryId::new("entry-1");
        let a = AssignmentId::for_pair("j1@acme.com", &e1);
        let b = AssignmentId::for_pair("j1@acme.com", &e1);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn assignment_id_separates_components() {
        // "ab" + "c" must not collide with "a" + "bc"
        let x = AssignmentId::for_pair("ab", &EntryId::new("c"));
        let y = AssignmentId::for_pair("a", &EntryId::new("bc"));
        assert_ne!(x, y);
    }

    #[test]
    fn status_parses_its_own_rendering() {
        for status in [
            EntryStatus::Draft,
            EntryStatus::Submitted,
            EntryStatus::UnderReview,
            EntryStatus::Shortlisted,
            EntryStatus::Winner,
            EntryStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<EntryStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn aggregates_ignore_incomplete_scores() {
        let e = EntryId::new("e");
        let scores = vec![
            Score::completed("a@x.com", &e, 8.0),
            Score::completed("b@x.com", &e, 6.0),
            Score::completed("c@x.com", &e, 1.0).in_progress(),
        ];
        let (avg, n) = score_aggregates(scores.iter());
        assert_eq!(n, 2);
        assert_eq!(avg, Some(7.0));
        assert_eq!(score_aggregates(Vec::<Score>::new().iter()), (None, 0));
    }

    #[test]
    fn query_matches_status_award_and_average() {
        let now = Utc::now();
        let mut entry = Entry::submitted("e1", "o1", "a1", now);
        let q = EntryQuery::submitted()
            .for_award(Some(&AwardId::new("a1")))
            .with_average();
        assert!(!q.matches(&entry));
        entry.average_score = Some(7.5);
        assert!(q.matches(&entry));
        assert!(!EntryQuery::submitted()
            .for_award(Some(&AwardId::new("a2")))
            .matches(&entry));
        assert!(!q.matches(&entry.clone().with_status(EntryStatus::Draft)));
    }
}
