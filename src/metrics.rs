//! # Latency Metrics
//!
//! The `stats` block in the user-visible verdict and the latency-distribution
//! testable property are both computed with an HDR histogram per client,
//! recording end-to-end request latency (invoke -> ok/fail/info). Percentile
//! reporting picks the client with the most samples as representative rather
//! than merging histograms across clients — `hdrhistogram`'s `Histogram::add`
//! can merge two histograms exactly, but doing so across clients whose
//! requests interleave in linear time would double-count contention effects
//! that belong to a single client's view; see DESIGN.md for why this
//! limitation is carried over rather than fixed.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;

/// Per-client latency collector. One per [`crate::client::ClientActor`].
pub struct LatencyCollector {
    histogram: Histogram<u64>,
    sample_count: u64,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self {
            // 3 significant figures, values up to 60s in nanoseconds.
            histogram: Histogram::new_with_bounds(1, 60_000_000_000, 3).expect("valid histogram bounds"),
            sample_count: 0,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        let ns = latency.as_nanos().min(u64::MAX as u128) as u64;
        let ns = ns.max(1);
        let _ = self.histogram.record(ns);
        self.sample_count += 1;
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn summary(&self, percentiles: &[f64]) -> LatencySummary {
        LatencySummary {
            samples: self.sample_count,
            min_ns: if self.sample_count == 0 { 0 } else { self.histogram.min() },
            max_ns: if self.sample_count == 0 { 0 } else { self.histogram.max() },
            mean_ns: self.histogram.mean(),
            percentiles: percentiles
                .iter()
                .map(|&p| PercentileValue {
                    percentile: p,
                    value_ns: self.histogram.value_at_quantile((p / 100.0).clamp(0.0, 1.0)),
                })
                .collect(),
        }
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// The latency portion of a run's `stats` block.
#[derive(Debug, Clone, Serialize, Default)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Pick the collector with the most samples as the representative one for
/// percentile reporting, per DESIGN.md's documented limitation.
pub fn representative_summary(collectors: &[LatencyCollector], percentiles: &[f64]) -> LatencySummary {
    collectors
        .iter()
        .max_by_key(|c| c.sample_count())
        .map(|c| c.summary(percentiles))
        .unwrap_or_default()
}

/// Message-level counters that make up the rest of the `stats` block:
/// total sends/receives and a derived messages-per-op ratio.
#[derive(Debug, Clone, Serialize, Default)]
pub struct NetworkStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub ops_completed: u64,
}

impl NetworkStats {
    pub fn messages_per_op(&self) -> f64 {
        if self.ops_completed == 0 {
            0.0
        } else {
            (self.messages_sent + self.messages_received) as f64 / self.ops_completed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collector_reports_zero_samples() {
        let collector = LatencyCollector::new();
        let summary = collector.summary(&[50.0, 99.0]);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.min_ns, 0);
    }

    #[test]
    fn records_and_reports_percentiles() {
        let mut collector = LatencyCollector::new();
        for ms in [10, 20, 30, 40, 50] {
            collector.record(Duration::from_millis(ms));
        }
        let summary = collector.summary(&[50.0]);
        assert_eq!(summary.samples, 5);
        assert!(summary.percentiles[0].value_ns >= 20_000_000);
    }

    #[test]
    fn representative_picks_largest_sample_count() {
        let mut small = LatencyCollector::new();
        small.record(Duration::from_millis(1));
        let mut big = LatencyCollector::new();
        for _ in 0..10 {
            big.record(Duration::from_millis(5));
        }
        let summary = representative_summary(&[small, big], &[50.0]);
        assert_eq!(summary.samples, 10);
    }

    #[test]
    fn messages_per_op_handles_zero_ops() {
        let stats = NetworkStats::default();
        assert_eq!(stats.messages_per_op(), 0.0);
    }
}
