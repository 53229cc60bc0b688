//! Judging Core Library
//!
//! Assignment of judges to award entries, conflict-of-interest detection and
//! shortlist ranking. Storage comes in through `judging_state::JudgingStore`
//! and outbound mail through [`Notifier`].
//!
//! Both engines split a pure planning step ([`plan_entry`],
//! [`rank_entries`]) from the effect step that persists and notifies.

pub mod assignment;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expertise;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod shortlist;
pub mod telemetry;

pub use assignment::{
    plan_entry, AssignmentEngine, AssignmentSummary, ConflictFinding, EntryConflicts, EntryPlan,
    SelectedJudge,
};
pub use config::{ConfigError, EntryOrder, JudgingConfig};
pub use conflict::{
    detect_conflict, email_domain, has_conflict, website_domain, ConflictReason, DomainMatching,
};
pub use error::{JudgingError, Result};
pub use expertise::{expertise_score, DEFAULT_KEYWORDS};
pub use notify::{
    EmailTemplate, EmailTemplates, Notifier, NotifyError, OutgoingEmail, RecordingNotifier,
    TracingNotifier,
};
pub use shortlist::{
    rank_entries, AwardShortlist, RankedEntry, ScoreStats, ShortlistRanker, CONSISTENCY_PENALTY,
};
