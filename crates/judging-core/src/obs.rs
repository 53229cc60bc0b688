//! Structured observability hooks for judging batches.
//!
//! - Batch-scoped tracing spans, attached with `Instrument` since batches
//!   await storage and notifier calls
//! - Emission functions for batch lifecycle events
//!
//! Events are emitted at `info!` level, failures at `warn!`. Filtering
//! follows `RUST_LOG`.

use tracing::{info, warn};

/// Kind of batch attached to the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Assign,
    Shortlist,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Assign => "assign",
            BatchKind::Shortlist => "shortlist",
        }
    }
}

/// The span a batch runs inside.
pub fn batch_span(batch_id: &str, kind: BatchKind) -> tracing::Span {
    tracing::info_span!("judging.batch", batch_id = %batch_id, kind = kind.as_str())
}

pub fn emit_batch_started(batch_id: &str, kind: BatchKind, total_entries: usize) {
    info!(
        event = "batch.started",
        batch_id = %batch_id,
        kind = kind.as_str(),
        total_entries = total_entries,
    );
}

pub fn emit_assignment_created(entry_id: &str, judge_email: &str, expertise_score: u32) {
    info!(
        event = "assignment.created",
        entry_id = %entry_id,
        judge_email = %judge_email,
        expertise_score = expertise_score,
    );
}

pub fn emit_conflict_detected(entry_id: &str, judge_email: &str, reason: &dyn std::fmt::Display) {
    info!(
        event = "conflict.detected",
        entry_id = %entry_id,
        judge_email = %judge_email,
        reason = %reason,
    );
}

/// Emit event: an entry was abandoned after a storage error.
pub fn emit_entry_skipped(entry_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "entry.skipped", entry_id = %entry_id, error = %error);
}

pub fn emit_entry_shortlisted(entry_id: &str, rank: usize, composite_score: f64) {
    info!(
        event = "entry.shortlisted",
        entry_id = %entry_id,
        rank = rank,
        composite_score = composite_score,
    );
}

pub fn emit_notification_failed(recipient: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notification.failed", recipient = %recipient, error = %error);
}

pub fn emit_batch_finished(
    batch_id: &str,
    kind: BatchKind,
    duration_ms: u64,
    affected: usize,
    skipped: usize,
) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        kind = kind.as_str(),
        duration_ms = duration_ms,
        affected = affected,
        skipped = skipped,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_span_create() {
        let span = batch_span("batch-1", BatchKind::Assign);
        let _guard = span.enter();
        emit_batch_started("batch-1", BatchKind::Assign, 0);
    }
}
