//! Global atomic counters for workflow observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    evaluations_scored: AtomicU64,
    transitions_applied: AtomicU64,
    transitions_refused: AtomicU64,
    scores_rejected: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_scored: AtomicU64::new(0),
            transitions_applied: AtomicU64::new(0),
            transitions_refused: AtomicU64::new(0),
            scores_rejected: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations_scored(&self) {
        self.evaluations_scored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_scored", "counter incremented");
    }

    pub fn inc_transitions_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_applied", "counter incremented");
    }

    pub fn inc_transitions_refused(&self) {
        self.transitions_refused.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_refused", "counter incremented");
    }

    /// Add `n` individually rejected score fields.
    pub fn add_scores_rejected(&self, n: u64) {
        self.scores_rejected.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_scored = self.evaluations_scored(),
            transitions_applied = self.transitions_applied(),
            transitions_refused = self.transitions_refused(),
            scores_rejected = self.scores_rejected(),
        );
    }

    pub fn evaluations_scored(&self) -> u64 {
        self.evaluations_scored.load(Ordering::Relaxed)
    }

    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn transitions_refused(&self) -> u64 {
        self.transitions_refused.load(Ordering::Relaxed)
    }

    pub fn scores_rejected(&self) -> u64 {
        self.scores_rejected.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations_scored.store(0, Ordering::Relaxed);
        self.transitions_applied.store(0, Ordering::Relaxed);
        self.transitions_refused.store(0, Ordering::Relaxed);
        self.scores_rejected.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_evaluations_scored();
        m.inc_evaluations_scored();
        assert_eq!(m.evaluations_scored(), 2);

        m.inc_transitions_applied();
        m.inc_transitions_refused();
        m.add_scores_rejected(3);
        assert_eq!(m.transitions_applied(), 1);
        assert_eq!(m.transitions_refused(), 1);
        assert_eq!(m.scores_rejected(), 3);

        m.reset();
        assert_eq!(m.evaluations_scored(), 0);
        assert_eq!(m.scores_rejected(), 0);
    }
}
