//! Cache observability counters.
//!
//! Each [`super::TranslationCache`] owns one `CacheMetrics`; the `/health`
//! endpoint renders its [`CacheReport`].

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads answered from the store
    hits: AtomicUsize,

    /// Reads that had to run the producer
    misses: AtomicUsize,

    /// Store calls that failed and were bypassed
    fallbacks: AtomicUsize,

    /// Entries removed by invalidation
    invalidations: AtomicUsize,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> usize {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> CacheReport {
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheReport {
            hits,
            misses,
            hit_rate,
            fallbacks: self.fallbacks(),
            invalidations: self.invalidations(),
        }
    }
}

/// Snapshot of [`CacheMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub hits: usize,
    pub misses: usize,

    /// Hit rate as a percentage (0-100)
    pub hit_rate: f64,

    pub fallbacks: usize,
    pub invalidations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_report_zero() {
        let report = CacheMetrics::new().report();

        assert_eq!(report.hits, 0);
        assert_eq!(report.misses, 0);
        assert_eq!(report.hit_rate, 0.0);
        assert_eq!(report.fallbacks, 0);
        assert_eq!(report.invalidations, 0);
    }

    #[test]
    fn test_report_hit_rate() {
        let metrics = CacheMetrics::new();

        // 3 hits, 1 miss = 75% hit rate
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let report = metrics.report();
        assert_eq!(report.hits, 3);
        assert_eq!(report.misses, 1);
        assert_eq!(report.hit_rate, 75.0);
    }

    #[test]
    fn test_fallbacks_do_not_affect_hit_rate() {
        let metrics = CacheMetrics::new();
        metrics.record_miss();
        metrics.record_fallback();
        metrics.record_fallback();

        let report = metrics.report();
        assert_eq!(report.fallbacks, 2);
        assert_eq!(report.hit_rate, 0.0);
    }

    #[test]
    fn test_instances_are_independent() {
        let first = CacheMetrics::new();
        let second = CacheMetrics::new();
        first.record_invalidation();

        assert_eq!(first.invalidations(), 1);
        assert_eq!(second.invalidations(), 0);
    }

    #[test]
    fn test_report_serializes() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();

        let json = serde_json::to_value(metrics.report()).expect("serialize");
        assert_eq!(json["hits"], 1);
        assert_eq!(json["hit_rate"], 100.0);
    }
}
