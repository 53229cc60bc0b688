//! Global atomic counters for judging batches.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    assignments_created: AtomicU64,
    conflicts_detected: AtomicU64,
    entries_shortlisted: AtomicU64,
    notifications_failed: AtomicU64,
    entries_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            assignments_created: AtomicU64::new(0),
            conflicts_detected: AtomicU64::new(0),
            entries_shortlisted: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            entries_skipped: AtomicU64::new(0),
        }
    }

    pub fn add_assignments(&self, n: u64) {
        self.assignments_created.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_conflicts(&self, n: u64) {
        self.conflicts_detected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_shortlisted(&self) {
        self.entries_shortlisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "notifications_failed", "counter incremented");
    }

    pub fn inc_skipped(&self) {
        self.entries_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "entries_skipped", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            assignments_created = self.assignments_created(),
            conflicts_detected = self.conflicts_detected(),
            entries_shortlisted = self.entries_shortlisted(),
            notifications_failed = self.notifications_failed(),
            entries_skipped = self.entries_skipped(),
        );
    }

    pub fn assignments_created(&self) -> u64 {
        self.assignments_created.load(Ordering::Relaxed)
    }

    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    pub fn entries_shortlisted(&self) -> u64 {
        self.entries_shortlisted.load(Ordering::Relaxed)
    }

    pub fn notifications_failed(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    pub fn entries_skipped(&self) -> u64 {
        self.entries_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.assignments_created.store(0, Ordering::Relaxed);
        self.conflicts_detected.store(0, Ordering::Relaxed);
        self.entries_shortlisted.store(0, Ordering::Relaxed);
        self.notifications_failed.store(0, Ordering::Relaxed);
        self.entries_skipped.store(0, Ordering::Relaxed);
    }
}
