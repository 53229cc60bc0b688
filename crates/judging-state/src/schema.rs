//! SurrealDB row shapes for the judging tables
//!
//! Tables:
//! - judges: judge contacts keyed by email
//! - organisations: entrant organisations
//! - awards: award categories
//! - entries: submissions with aggregate score fields
//! - assignments: judge ↔ entry edges (unique per pair)
//! - scores: judge evaluations
//!
//! Rows are converted to and from `storage_traits` types at the boundary;
//! enum-valued columns are stored as strings and parsed on the way out.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::storage_traits::{
    Assignment, AssignmentId, Award, AwardId, Entry, EntryId, EntryStatus, Judge, Organisation,
    OrganisationId, Recommendation, Score, StorageResult,
};

/// Serialize chrono DateTime as a SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(DateTime::from(SurrealDatetime::deserialize(deserializer)?))
    }
}

/// Serialize optional chrono DateTime as an optional SurrealDB datetime
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&date.map(SurrealDatetime::from), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub email: String,
    pub name: String,
    pub expertise_notes: String,
    pub company: Option<String>,
    pub active: bool,
}

impl From<Judge> for JudgeRow {
    fn from(j: Judge) -> Self {
        JudgeRow {
            id: None,
            email: j.email,
            name: j.name,
            expertise_notes: j.expertise_notes,
            company: j.company,
            active: j.active,
        }
    }
}

impl From<JudgeRow> for Judge {
    fn from(row: JudgeRow) -> Self {
        Judge {
            email: row.email,
            name: row.name,
            expertise_notes: row.expertise_notes,
            company: row.company,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub organisation_id: String,
    pub company_name: String,
    pub website: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

impl From<Organisation> for OrganisationRow {
    fn from(o: Organisation) -> Self {
        OrganisationRow {
            id: None,
            organisation_id: o.id.0,
            company_name: o.company_name,
            website: o.website,
            contact_name: o.contact_name,
            contact_email: o.contact_email,
        }
    }
}

impl From<OrganisationRow> for Organisation {
    fn from(row: OrganisationRow) -> Self {
        Organisation {
            id: OrganisationId(row.organisation_id),
            company_name: row.company_name,
            website: row.website,
            contact_name: row.contact_name,
            contact_email: row.contact_email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub award_id: String,
    pub name: String,
    pub category: String,
    pub active: bool,
}

impl From<Award> for AwardRow {
    fn from(a: Award) -> Self {
        AwardRow {
            id: None,
            award_id: a.id.0,
            name: a.name,
            category: a.category,
            active: a.active,
        }
    }
}

impl From<AwardRow> for Award {
    fn from(row: AwardRow) -> Self {
        Award {
            id: AwardId(row.award_id),
            name: row.name,
            category: row.category,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub entry_id: String,
    pub organisation_id: String,
    pub award_id: String,
    /// "draft" | "submitted" | "under_review" | "shortlisted" | "winner" | "rejected"
    pub status: String,
    pub average_score: Option<f64>,
    pub completed_score_count: u32,
    pub shortlisted: bool,
    #[serde(default, with = "surreal_datetime_opt")]
    pub shortlisted_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub submitted_at: DateTime<Utc>,
}

impl From<Entry> for EntryRow {
    fn from(e: Entry) -> Self {
        EntryRow {
            id: None,
            entry_id: e.id.0,
            organisation_id: e.organisation_id.0,
            award_id: e.award_id.0,
            status: e.status.as_str().to_string(),
            average_score: e.average_score,
            completed_score_count: e.completed_score_count,
            shortlisted: e.shortlisted,
            shortlisted_at: e.shortlisted_at,
            submitted_at: e.submitted_at,
        }
    }
}

impl EntryRow {
    pub fn into_entry(self) -> StorageResult<Entry> {
        Ok(Entry {
            id: EntryId(self.entry_id),
            organisation_id: OrganisationId(self.organisation_id),
            award_id: AwardId(self.award_id),
            status: EntryStatus::from_str(&self.status)?,
            average_score: self.average_score,
            completed_score_count: self.completed_score_count,
            shortlisted: self.shortlisted,
            shortlisted_at: self.shortlisted_at,
            submitted_at: self.submitted_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub assignment_id: String,
    pub judge_email: String,
    pub entry_id: String,
    pub completed: bool,
    #[serde(with = "surreal_datetime")]
    pub assigned_at: DateTime<Utc>,
}

impl From<&Assignment> for AssignmentRow {
    fn from(a: &Assignment) -> Self {
        AssignmentRow {
            id: None,
            assignment_id: a.id.as_str().to_string(),
            judge_email: a.judge_email.clone(),
            entry_id: a.entry_id.0.clone(),
            completed: a.completed,
            assigned_at: a.assigned_at,
        }
    }
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        let entry_id = EntryId(row.entry_id);
        Assignment {
            // Recomputed rather than trusted: the id is a pure function of the pair.
            id: AssignmentId::for_pair(&row.judge_email, &entry_id),
            judge_email: row.judge_email,
            entry_id,
            completed: row.completed,
            assigned_at: row.assigned_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub judge_email: String,
    pub entry_id: String,
    pub total_score: f64,
    pub completed: bool,
    /// "shortlist" | "maybe" | "reject"
    pub recommendation: Option<String>,
}

impl From<Score> for ScoreRow {
    fn from(s: Score) -> Self {
        ScoreRow {
            id: None,
            judge_email: s.judge_email,
            entry_id: s.entry_id.0,
            total_score: s.total_score,
            completed: s.completed,
            recommendation: s.recommendation.map(|r| r.as_str().to_string()),
        }
    }
}

impl ScoreRow {
    pub fn into_score(self) -> StorageResult<Score> {
        Ok(Score {
            judge_email: self.judge_email,
            entry_id: EntryId(self.entry_id),
            total_score: self.total_score,
            completed: self.completed,
            recommendation: self
                .recommendation
                .as_deref()
                .map(Recommendation::from_str)
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_row_round_trips_status() {
        let entry =
            Entry::submitted("e1", "o1", "a1", Utc::now()).with_status(EntryStatus::UnderReview);
        let row = EntryRow::from(entry.clone());
        assert_eq!(row.status, "under_review");
        assert_eq!(row.into_entry().unwrap(), entry);
    }

    #[test]
    fn entry_row_rejects_unknown_status() {
        let mut row = EntryRow::from(Entry::submitted("e1", "o1", "a1", Utc::now()));
        row.status = "archived".to_string();
        assert!(row.into_entry().is_err());
    }

    #[test]
    fn score_row_parses_recommendation() {
        let e = EntryId::new("e1");
        let row = ScoreRow::from(
            Score::completed("j@x.com", &e, 7.5).recommending(Recommendation::Shortlist),
        );
        assert_eq!(row.recommendation.as_deref(), Some("shortlist"));
        let score = row.into_score().unwrap();
        assert_eq!(score.recommendation, Some(Recommendation::Shortlist));
    }

    #[test]
    fn assignment_row_serializes_without_record_id() {
        let a = Assignment::new("j@x.com", &EntryId::new("e1"), Utc::now());
        let json = serde_json::to_string(&AssignmentRow::from(&a)).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains(a.id.as_str()));
    }
}
