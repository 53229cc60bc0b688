//! Shortlist ranking.
//!
//! Entries with enough completed scores are ranked by a composite of their
//! mean score and a consistency penalty:
//!
//! ```text
//! composite = average - 0.1 * population_std_dev
//! ```
//!
//! so an entry judges agree on beats an equally rated but divisive one. The
//! top N per award are marked shortlisted and their contacts notified.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use judging_state::{
    AwardId, EntryDetail, EntryFetchOrder, EntryId, EntryQuery, JudgingStore, Recommendation,
};
use serde::Serialize;
use tracing::Instrument;

use crate::config::JudgingConfig;
use crate::error::{JudgingError, Result};
use crate::metrics::METRICS;
use crate::notify::Notifier;
use crate::obs::{self, BatchKind};

/// Weight of the standard deviation in the composite score.
pub const CONSISTENCY_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreStats {
    pub average: f64,
    pub std_dev: f64,
}

impl ScoreStats {
    /// Mean and population standard deviation. `None` for no scores.
    pub fn from_totals(totals: &[f64]) -> Option<Self> {
        if totals.is_empty() {
            return None;
        }
        let n = totals.len() as f64;
        let average = totals.iter().sum::<f64>() / n;
        let variance = totals.iter().map(|t| (t - average).powi(2)).sum::<f64>() / n;
        Some(Self {
            average,
            std_dev: variance.sqrt(),
        })
    }

    pub fn composite(&self) -> f64 {
        self.average - CONSISTENCY_PENALTY * self.std_dev
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based position in the shortlist.
    pub rank: usize,
    pub entry_id: EntryId,
    pub organisation_name: String,
    pub award_id: AwardId,
    pub average: f64,
    pub std_dev: f64,
    pub composite_score: f64,
    pub completed_scores: usize,
    /// Judges recommending a shortlist. Reported only, never ranked on.
    pub shortlist_recommendations: usize,
}

/// Per-award result of [`ShortlistRanker::generate_all_shortlists`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwardShortlist {
    pub award_id: AwardId,
    pub award_name: String,
    pub shortlist_count: usize,
}

/// Rank eligible entries by composite score, highest first.
///
/// Entries with fewer than `min_scores` completed scores are dropped. Ties
/// keep input order.
pub fn rank_entries(details: &[EntryDetail], min_scores: usize) -> Vec<RankedEntry> {
    let mut ranked: Vec<RankedEntry> = details
        .iter()
        .filter_map(|detail| {
            let completed: Vec<_> = detail.completed_scores().collect();
            if completed.len() < min_scores {
                return None;
            }
            let totals: Vec<f64> = completed.iter().map(|s| s.total_score).collect();
            let stats = ScoreStats::from_totals(&totals)?;
            Some(RankedEntry {
                rank: 0,
                entry_id: detail.entry.id.clone(),
                organisation_name: detail.organisation.company_name.clone(),
                award_id: detail.entry.award_id.clone(),
                average: stats.average,
                std_dev: stats.std_dev,
                composite_score: stats.composite(),
                completed_scores: completed.len(),
                shortlist_recommendations: completed
                    .iter()
                    .filter(|s| s.recommendation == Some(Recommendation::Shortlist))
                    .count(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    for (i, entry) in ranked.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    ranked
}

pub struct ShortlistRanker {
    store: Arc<dyn JudgingStore>,
    notifier: Arc<dyn Notifier>,
    config: JudgingConfig,
}

impl ShortlistRanker {
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

    async fn load_candidates(&self, award_id: &AwardId) -> Result<Vec<EntryDetail>> {
        if self.store.get_award(award_id).await?.is_none() {
            return Err(JudgingError::AwardNotFound(award_id.clone()));
        }
        let query = EntryQuery::submitted()
            .for_award(Some(award_id))
            .with_average()
            .ordered_by(EntryFetchOrder::AverageScoreDesc);
        Ok(self.store.list_entries(&query).await?)
    }

    /// Rank an award's entries without marking or notifying anything.
    pub async fn preview_shortlist(
        &self,
        award_id: &AwardId,
        top_n: Option<usize>,
    ) -> Result<Vec<RankedEntry>> {
        let details = self.load_candidates(award_id).await?;
        let mut ranked = rank_entries(&details, self.config.min_scores);
        ranked.truncate(top_n.unwrap_or(self.config.default_top_n));
        Ok(ranked)
    }

    /// Shortlist the top entries of one award.
    ///
    /// Entries whose shortlist mark fails with a non-fatal storage error are
    /// left out of the result.
    pub async fn generate_shortlist(
        &self,
        award_id: &AwardId,
        top_n: Option<usize>,
    ) -> Result<Vec<RankedEntry>> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let span = obs::batch_span(&batch_id, BatchKind::Shortlist);
        self.run_batch(batch_id, award_id, top_n.unwrap_or(self.config.default_top_n))
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        batch_id: String,
        award_id: &AwardId,
        top_n: usize,
    ) -> Result<Vec<RankedEntry>> {
        let started = Instant::now();
        let details = self.load_candidates(award_id).await?;
        obs::emit_batch_started(&batch_id, BatchKind::Shortlist, details.len());

        let mut ranked = rank_entries(&details, self.config.min_scores);
        ranked.truncate(top_n);

        let by_id: HashMap<&EntryId, &EntryDetail> =
            details.iter().map(|d| (&d.entry.id, d)).collect();
        let mut shortlisted = Vec::with_capacity(ranked.len());
        let mut skipped = 0;

        for entry in ranked {
            match self.store.mark_shortlisted(&entry.entry_id, Utc::now()).await {
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    obs::emit_entry_skipped(entry.entry_id.as_str(), &err);
                    METRICS.inc_skipped();
                    skipped += 1;
                    continue;
                }
            }
            obs::emit_entry_shortlisted(entry.entry_id.as_str(), entry.rank, entry.composite_score);

            // The mark stands either way; only a notified entry is counted
            let notified = match by_id.get(&entry.entry_id) {
                Some(detail) => match self.notifier.notify_entry_shortlisted(detail).await {
                    Ok(()) => true,
                    Err(err) => {
                        let recipient = detail
                            .organisation
                            .contact_email
                            .as_deref()
                            .unwrap_or(detail.organisation.company_name.as_str());
                        obs::emit_notification_failed(recipient, &err);
                        METRICS.inc_notifications_failed();
                        false
                    }
                },
                None => true,
            };
            if notified {
                METRICS.inc_shortlisted();
            }
            shortlisted.push(entry);
        }

        obs::emit_batch_finished(
            &batch_id,
            BatchKind::Shortlist,
            started.elapsed().as_millis() as u64,
            shortlisted.len(),
            skipped,
        );
        METRICS.flush();
        Ok(shortlisted)
    }

    /// Shortlist every active award in turn.
    pub async fn generate_all_shortlists(
        &self,
        top_n: Option<usize>,
    ) -> Result<Vec<AwardShortlist>> {
        let awards = self.store.list_active_awards().await?;
        let mut results = Vec::with_capacity(awards.len());
        for award in awards {
            let shortlist = self.generate_shortlist(&award.id, top_n).await?;
            results.push(AwardShortlist {
                award_id: award.id,
                award_name: award.name,
                shortlist_count: shortlist.len(),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judging_state::{Award, Entry, Organisation, Score};

    fn detail(id: &str, totals: &[f64]) -> EntryDetail {
        let entry_id = EntryId::new(id);
        EntryDetail {
            entry: Entry::submitted(id, "org-1", "award-1", Utc::now()),
            organisation: Organisation::new("org-1", "Acme Ltd"),
            award: Award::new("award-1", "Retailer of the Year", "Retail"),
            scores: totals
                .iter()
                .enumerate()
                .map(|(i, t)| Score::completed(format!("j{i}@x.org"), &entry_id, *t))
                .collect(),
        }
    }

    #[test]
    fn composite_penalises_spread() {
        let stats = ScoreStats::from_totals(&[8.0, 7.0, 9.0]).unwrap();
        assert!((stats.average - 8.0).abs() < 1e-9);
        assert!((stats.std_dev - 0.816_496_580_927_726).abs() < 1e-9);
        assert!((stats.composite() - 7.918_350_341_907_227).abs() < 1e-9);
    }

    #[test]
    fn no_totals_no_stats() {
        assert_eq!(ScoreStats::from_totals(&[]), None);
    }

    #[test]
    fn consistent_entry_outranks_divisive_one() {
        let details = vec![detail("divisive", &[10.0, 6.0]), detail("steady", &[8.0, 8.0])];
        let ranked = rank_entries(&details, 2);
        assert_eq!(ranked[0].entry_id, EntryId::new("steady"));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn drops_entries_below_min_scores() {
        let mut thin = detail("thin", &[9.0, 9.0]);
        thin.scores[1] = thin.scores[1].clone().in_progress();
        let ranked = rank_entries(&[thin, detail("full", &[7.0, 7.0])], 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].entry_id, EntryId::new("full"));
    }

    #[test]
    fn ties_keep_input_order() {
        let details = vec![detail("first", &[7.0, 7.0]), detail("second", &[7.0, 7.0])];
        let ranked = rank_entries(&details, 2);
        assert_eq!(ranked[0].entry_id, EntryId::new("first"));
    }

    #[test]
    fn counts_shortlist_recommendations() {
        let mut d = detail("e", &[8.0, 8.0]);
        d.scores[0] = d.scores[0].clone().recommending(Recommendation::Shortlist);
        let ranked = rank_entries(&[d], 2);
        assert_eq!(ranked[0].shortlist_recommendations, 1);
    }
}
