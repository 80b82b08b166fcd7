//! Lock-free arbitration counters
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are
//! statistical counters only. Do NOT use these atomics for coordination
//! or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters for arbitration outcomes across all coordinators
#[derive(Debug, Default)]
pub struct Metrics {
    expected_balls: AtomicU64,
    unexpected_balls: AtomicU64,
    lost_balls: AtomicU64,
}

/// Point-in-time snapshot of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub expected_balls: u64,
    pub unexpected_balls: u64,
    pub lost_balls: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_expected_ball(&self) {
        self.expected_balls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unexpected_ball(&self) {
        self.unexpected_balls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lost_ball(&self) {
        self.lost_balls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSummary {
        MetricsSummary {
            expected_balls: self.expected_balls.load(Ordering::Relaxed),
            unexpected_balls: self.unexpected_balls.load(Ordering::Relaxed),
            lost_balls: self.lost_balls.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.snapshot();
        info!(
            expected_balls = %summary.expected_balls,
            unexpected_balls = %summary.unexpected_balls,
            lost_balls = %summary.lost_balls,
            "transit_metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_expected_ball();
        metrics.record_expected_ball();
        metrics.record_unexpected_ball();
        metrics.record_lost_ball();

        let summary = metrics.snapshot();
        assert_eq!(summary.expected_balls, 2);
        assert_eq!(summary.unexpected_balls, 1);
        assert_eq!(summary.lost_balls, 1);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_lost_ball();
        assert_eq!(metrics.snapshot().lost_balls, 1);
        assert_eq!(metrics.snapshot().lost_balls, 1);
    }
}
