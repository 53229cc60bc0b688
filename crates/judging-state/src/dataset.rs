//! Dataset import
//!
//! A dataset is a JSON document holding reference data, entries and scores:
//!
//! ```json
//! {
//!   "judges": [{"email": "j1@example.org", "name": "Jo", "expertise_notes": "retail"}],
//!   "organisations": [{"id": "org-1", "company_name": "Acme Ltd", "website": "https://acme.com"}],
//!   "awards": [{"id": "award-1", "name": "Retailer of the Year", "category": "Retail"}],
//!   "entries": [{"id": "entry-1", "organisation_id": "org-1", "award_id": "award-1",
//!                "status": "submitted", "submitted_at": "2026-03-01T09:00:00Z"}],
//!   "scores": [{"judge_email": "j1@example.org", "entry_id": "entry-1",
//!               "total_score": 8.0, "completed": true}]
//! }
//! ```
//!
//! The whole document is validated before anything is written.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub judges: Vec<Judge>,
    #[serde(default)]
    pub organisations: Vec<Organisation>,
    #[serde(default)]
    pub awards: Vec<Award>,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub scores: Vec<Score>,
}

/// Counts of records written by [`Dataset::load_into`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub judges: usize,
    pub organisations: usize,
    pub awards: usize,
    pub entries: usize,
    pub scores: usize,
}

impl Dataset {
    pub fn from_json_str(s: &str) -> StorageResult<Self> {
        serde_json::from_str(s).map_err(|e| StorageError::invalid("dataset", e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StorageError::invalid("dataset", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    /// Check references and field shapes across the whole document.
    pub fn validate(&self) -> StorageResult<()> {
        let mut emails = HashSet::new();
        for judge in &self.judges {
            if !judge.email.contains('@') {
                return Err(StorageError::invalid(
                    "judge",
                    format!("email without domain: {}", judge.email),
                ));
            }
            if !emails.insert(judge.email.as_str()) {
                return Err(StorageError::invalid(
                    "judge",
                    format!("duplicate email: {}", judge.email),
                ));
            }
        }

        let organisations: HashSet<&OrganisationId> =
            self.organisations.iter().map(|o| &o.id).collect();
        let awards: HashSet<&AwardId> = self.awards.iter().map(|a| &a.id).collect();
        let mut entries = HashSet::new();
        for entry in &self.entries {
            if !organisations.contains(&entry.organisation_id) {
                return Err(StorageError::invalid(
                    "entry",
                    format!(
                        "{} references unknown organisation {}",
                        entry.id, entry.organisation_id
                    ),
                ));
            }
            if !awards.contains(&entry.award_id) {
                return Err(StorageError::invalid(
                    "entry",
                    format!("{} references unknown award {}", entry.id, entry.award_id),
                ));
            }
            if !entries.insert(&entry.id) {
                return Err(StorageError::invalid(
                    "entry",
                    format!("duplicate id: {}", entry.id),
                ));
            }
        }

        for score in &self.scores {
            if !entries.contains(&score.entry_id) {
                return Err(StorageError::invalid(
                    "score",
                    format!("references unknown entry {}", score.entry_id),
                ));
            }
            if !score.total_score.is_finite() {
                return Err(StorageError::invalid(
                    "score",
                    format!(
                        "non-finite total for {} on {}",
                        score.judge_email, score.entry_id
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Validate, then write every record in dependency order.
    pub async fn load_into(&self, store: &dyn JudgingStore) -> StorageResult<ImportSummary> {
        self.validate()?;

        for judge in &self.judges {
            store.put_judge(judge.clone()).await?;
        }
        for organisation in &self.organisations {
            store.put_organisation(organisation.clone()).await?;
        }
        for award in &self.awards {
            store.put_award(award.clone()).await?;
        }
        for entry in &self.entries {
            store.put_entry(entry.clone()).await?;
        }
        for score in &self.scores {
            store.record_score(score.clone()).await?;
        }

        let summary = ImportSummary {
            judges: self.judges.len(),
            organisations: self.organisations.len(),
            awards: self.awards.len(),
            entries: self.entries.len(),
            scores: self.scores.len(),
        };
        info!(
            judges = summary.judges,
            organisations = summary.organisations,
            awards = summary.awards,
            entries = summary.entries,
            scores = summary.scores,
            "dataset imported"
        );
        Ok(summary)
    }
}
