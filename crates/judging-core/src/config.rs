//! Batch configuration.
//!
//! Load judging parameters from TOML so coordinators can tune a program
//! without code changes. Every field has a default, so an empty file (or no
//! file) gives the stock behaviour.
//!
//! ```
//! use judging_core::JudgingConfig;
//!
//! let config = JudgingConfig::from_toml_str(r#"
//!     judges_per_entry = 4
//!     min_scores = 3
//!     entry_order = "retrieval"
//!     domain_matching = "case_insensitive"
//! "#).unwrap();
//!
//! assert_eq!(config.judges_per_entry, 4);
//! assert_eq!(config.default_top_n, 5);
//! ```

use std::path::Path;

use judging_state::EntryFetchOrder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflict::DomainMatching;
use crate::expertise::DEFAULT_KEYWORDS;
use crate::notify::EmailTemplates;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Order in which the assignment engine walks submitted entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrder {
    /// Oldest submission first.
    #[default]
    SubmittedAt,
    /// Whatever order the store returns.
    Retrieval,
}

impl EntryOrder {
    pub fn fetch_order(self) -> EntryFetchOrder {
        match self {
            EntryOrder::SubmittedAt => EntryFetchOrder::SubmittedAt,
            EntryOrder::Retrieval => EntryFetchOrder::Retrieval,
        }
    }
}

/// Immutable parameters for assignment and shortlist batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct JudgingConfig {
    /// Target number of judges per entry.
    pub judges_per_entry: usize,

    /// Completed scores an entry needs before it can be shortlisted.
    pub min_scores: usize,

    /// Shortlist size when the caller does not pass one.
    pub default_top_n: usize,

    /// Sector keywords worth +5 each when shared by category and notes.
    pub expertise_keywords: Vec<String>,

    pub entry_order: EntryOrder,

    pub domain_matching: DomainMatching,

    pub templates: EmailTemplates,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            judges_per_entry: 3,
            min_scores: 2,
            default_top_n: 5,
            expertise_keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            entry_order: EntryOrder::default(),
            domain_matching: DomainMatching::default(),
            templates: EmailTemplates::default(),
        }
    }
}

impl JudgingConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.judges_per_entry == 0 {
            return Err(ConfigError::Invalid(
                "judges_per_entry must be at least 1".to_string(),
            ));
        }
        if self.min_scores == 0 {
            return Err(ConfigError::Invalid(
                "min_scores must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_judges_per_entry(mut self, n: usize) -> Self {
        self.judges_per_entry = n;
        self
    }

    pub fn with_min_scores(mut self, n: usize) -> Self {
        self.min_scores = n;
        self
    }

    pub fn with_entry_order(mut self, order: EntryOrder) -> Self {
        self.entry_order = order;
        self
    }

    pub fn with_domain_matching(mut self, matching: DomainMatching) -> Self {
        self.domain_matching = matching;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_program_rules() {
        let config = JudgingConfig::default();
        assert_eq!(config.judges_per_entry, 3);
        assert_eq!(config.min_scores, 2);
        assert_eq!(config.default_top_n, 5);
        assert_eq!(
            config.expertise_keywords,
            vec!["technology", "manufacturing", "retail", "services", "export"]
        );
        assert_eq!(config.entry_order, EntryOrder::SubmittedAt);
        assert_eq!(config.domain_matching, DomainMatching::CaseSensitive);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(
            JudgingConfig::from_toml_str("").unwrap(),
            JudgingConfig::default()
        );
    }

    #[test]
    fn rejects_zero_judges_per_entry() {
        let err = JudgingConfig::from_toml_str("judges_per_entry = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_entry_order() {
        assert!(JudgingConfig::from_toml_str("entry_order = \"random\"").is_err());
    }

    #[test]
    fn template_overrides_are_partial() {
        let config = JudgingConfig::from_toml_str(
            r#"
            [templates.judge_assigned]
            subject = "New entry for {{judge_name}}"
            body = "Please score {{entry_id}}."
            "#,
        )
        .unwrap();
        assert_eq!(
            config.templates.judge_assigned.subject,
            "New entry for {{judge_name}}"
        );
        assert_eq!(
            config.templates.entry_shortlisted,
            EmailTemplates::default().entry_shortlisted
        );
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judging.toml");
        std::fs::write(&path, "min_scores = 3\nexpertise_keywords = [\"energy\"]\n").unwrap();
        let config = JudgingConfig::load(&path).unwrap();
        assert_eq!(config.min_scores, 3);
        assert_eq!(config.expertise_keywords, vec!["energy"]);
    }
}
