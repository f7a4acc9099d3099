//! Filter telemetry: ingestion counters and latency histograms.
//!
//! All counters are lock-free and saturate instead of wrapping. Readers take
//! a [`FilterMetricsSnapshot`], which serializes for whatever exporter the
//! embedding service runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const HISTOGRAM_BUCKETS: usize = 24;
const HISTOGRAM_MAX_US: u64 = 10_000_000;

fn bump(counter: &AtomicU64, delta: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(delta))
    });
}

/// Latency histogram with exponential bucket boundaries in microseconds.
#[derive(Debug)]
pub struct LatencyHistogram {
    boundaries: Vec<u64>,
    // One more bucket than boundaries; the last holds everything above.
    buckets: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram whose boundaries grow geometrically up to
    /// `max_latency_us`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn new(num_buckets: usize, max_latency_us: u64) -> Self {
        let num_buckets = num_buckets.max(1);
        let base = (max_latency_us.max(2) as f64).powf(1.0 / num_buckets as f64);
        let mut boundaries: Vec<u64> = (1..=num_buckets)
            .map(|i| base.powf(i as f64) as u64)
            .collect();
        boundaries.dedup();

        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            boundaries,
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Records one observation.
    pub fn record(&self, elapsed: Duration) {
        self.record_us(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    }

    /// Records one observation given in microseconds.
    pub fn record_us(&self, latency_us: u64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| latency_us <= b)
            .unwrap_or(self.boundaries.len());
        bump(&self.buckets[idx], 1);
        bump(&self.sum, latency_us);
        bump(&self.count, 1);
        self.min.fetch_min(latency_us, Ordering::Relaxed);
        self.max.fetch_max(latency_us, Ordering::Relaxed);
    }

    /// Number of recorded observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Upper bound of the bucket holding the `p` quantile, `p` in `0.0..=1.0`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }

        let target = ((total as f64) * p.clamp(0.0, 1.0)).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative = cumulative.saturating_add(bucket.load(Ordering::Relaxed));
            if cumulative >= target {
                return self
                    .boundaries
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| self.max.load(Ordering::Relaxed));
            }
        }
        self.max.load(Ordering::Relaxed)
    }

    /// Mean latency in microseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Copies the current distribution.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count();
        HistogramSnapshot {
            count,
            avg_us: self.average(),
            p50_us: self.percentile(0.5),
            p95_us: self.percentile(0.95),
            p99_us: self.percentile(0.99),
            min_us: if count == 0 {
                0
            } else {
                self.min.load(Ordering::Relaxed)
            },
            max_us: self.max.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new(HISTOGRAM_BUCKETS, HISTOGRAM_MAX_US)
    }
}

/// Point-in-time view of a [`LatencyHistogram`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    /// Observations recorded.
    pub count: u64,
    /// Mean latency in microseconds.
    pub avg_us: f64,
    /// 50th percentile bucket bound.
    pub p50_us: u64,
    /// 95th percentile bucket bound.
    pub p95_us: u64,
    /// 99th percentile bucket bound.
    pub p99_us: u64,
    /// Smallest observation, 0 when empty.
    pub min_us: u64,
    /// Largest observation.
    pub max_us: u64,
}

/// Counters and timers maintained by [`super::PatternStorage`] and the
/// refresh worker.
#[derive(Debug, Default)]
pub struct FilterMetrics {
    total_received: AtomicU64,
    valid_received: AtomicU64,
    matched: AtomicU64,
    parse_errors: AtomicU64,
    too_old: AtomicU64,
    skipped_patterns: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    matching_timer: LatencyHistogram,
    refresh_timer: LatencyHistogram,
}

impl FilterMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        bump(&self.total_received, 1);
    }

    /// Increments the valid counter and returns its new value.
    pub(crate) fn record_valid(&self) -> u64 {
        let prev = self
            .valid_received
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(1))
            })
            .unwrap_or(u64::MAX);
        prev.saturating_add(1)
    }

    pub(crate) fn record_matched(&self) {
        bump(&self.matched, 1);
    }

    pub(crate) fn record_parse_error(&self) {
        bump(&self.parse_errors, 1);
    }

    pub(crate) fn record_too_old(&self) {
        bump(&self.too_old, 1);
    }

    pub(crate) fn record_skipped_patterns(&self, n: u64) {
        bump(&self.skipped_patterns, n);
    }

    pub(crate) fn record_refresh(&self, elapsed: Duration, ok: bool) {
        bump(&self.refreshes, 1);
        if !ok {
            bump(&self.refresh_failures, 1);
        }
        self.refresh_timer.record(elapsed);
    }

    /// Timer over sampled `match_patterns` calls.
    #[must_use]
    pub const fn matching_timer(&self) -> &LatencyHistogram {
        &self.matching_timer
    }

    /// Timer over every refresh, successful or not.
    #[must_use]
    pub const fn refresh_timer(&self) -> &LatencyHistogram {
        &self.refresh_timer
    }

    /// Copies every counter and timer.
    #[must_use]
    pub fn snapshot(&self) -> FilterMetricsSnapshot {
        FilterMetricsSnapshot {
            total_received: self.total_received.load(Ordering::Relaxed),
            valid_received: self.valid_received.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            too_old: self.too_old.load(Ordering::Relaxed),
            skipped_patterns: self.skipped_patterns.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            matching_timer: self.matching_timer.snapshot(),
            refresh_timer: self.refresh_timer.snapshot(),
        }
    }
}

/// Serializable copy of [`FilterMetrics`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMetricsSnapshot {
    pub total_received: u64,
    pub valid_received: u64,
    pub matched: u64,
    pub parse_errors: u64,
    pub too_old: u64,
    pub skipped_patterns: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub matching_timer: HistogramSnapshot,
    pub refresh_timer: HistogramSnapshot,
}
