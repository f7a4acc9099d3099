//! Pattern storage: the matching front door.
//!
//! `PatternStorage` owns one published generation of each index behind an
//! `ArcSwap`. Ingestion threads load the current generation without locking;
//! `refresh()` compiles a full pattern snapshot into fresh generations and
//! stores them. A reader that loaded the previous generation keeps using it
//! until it drops its guard.
//!
//! The two indexes are published by separate stores, so a metric processed
//! mid-refresh may see the new glob index beside the old tag index. Tagged
//! and untagged metrics never consult the same index, which keeps each
//! individual match consistent.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::FilterResult;
use crate::index::{GlobIndex, TagIndex};
use crate::metric::{parse_metric_at, MatchedMetric, ParsedMetric};
use crate::pattern::CompiledPattern;
use crate::storage::PatternSource;
use crate::time::{Clock, SystemClock};

pub mod metrics;

pub use metrics::{FilterMetrics, FilterMetricsSnapshot, HistogramSnapshot, LatencyHistogram};

/// Outcome of one successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStats {
    /// Patterns compiled into the glob index.
    pub glob_patterns: usize,
    /// Patterns compiled into the tag-predicate index.
    pub tagged_patterns: usize,
    /// Patterns that failed to compile and were left out.
    pub skipped_patterns: usize,
    /// Skipped patterns that were not already skipped by the previous refresh.
    pub newly_skipped: usize,
}

/// Serializable view of the storage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    /// Patterns in the published glob index.
    pub glob_patterns: usize,
    /// Patterns in the published tag-predicate index.
    pub tagged_patterns: usize,
    /// Counters and timers.
    pub metrics: FilterMetricsSnapshot,
}

/// Compiled pattern indexes plus the ingestion entry point.
pub struct PatternStorage {
    source: Arc<dyn PatternSource>,
    config: FilterConfig,
    clock: Arc<dyn Clock>,
    metrics: FilterMetrics,
    glob_index: ArcSwap<GlobIndex>,
    tag_index: ArcSwap<TagIndex>,
    // Invalid patterns already warned about; only new ones warn again.
    reported_invalid: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for PatternStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternStorage")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("glob_patterns", &self.glob_index.load().len())
            .field("tagged_patterns", &self.tag_index.load().len())
            .finish_non_exhaustive()
    }
}

impl PatternStorage {
    /// Creates storage with empty indexes, reading time from the system
    /// clock. Nothing matches until the first `refresh()`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Validation` if `config` is invalid.
    pub fn new(source: Arc<dyn PatternSource>, config: FilterConfig) -> FilterResult<Self> {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    /// Like [`PatternStorage::new`] with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Validation` if `config` is invalid.
    pub fn with_clock(
        source: Arc<dyn PatternSource>,
        config: FilterConfig,
        clock: Arc<dyn Clock>,
    ) -> FilterResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            clock,
            metrics: FilterMetrics::new(),
            glob_index: ArcSwap::from_pointee(GlobIndex::default()),
            tag_index: ArcSwap::from_pointee(TagIndex::default()),
            reported_invalid: Mutex::new(HashSet::new()),
        })
    }

    /// Creates storage and loads the current patterns.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad config, or the error of the
    /// initial refresh.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use kyro_filter::config::FilterConfig;
    /// use kyro_filter::filter::PatternStorage;
    /// use kyro_filter::storage::InMemoryPatternStore;
    ///
    /// let store = Arc::new(InMemoryPatternStore::with_patterns(["servers.*.cpu"]));
    /// let storage = PatternStorage::open(store, FilterConfig::default()).unwrap();
    /// assert_eq!(storage.glob_index().len(), 1);
    /// ```
    pub fn open(source: Arc<dyn PatternSource>, config: FilterConfig) -> FilterResult<Self> {
        let storage = Self::new(source, config)?;
        storage.refresh()?;
        Ok(storage)
    }

    /// Rebuilds both indexes from the pattern source.
    ///
    /// On a source error the published indexes are left untouched and the
    /// error is returned. Patterns that fail to compile are skipped.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Storage` if the source cannot be read.
    pub fn refresh(&self) -> FilterResult<RefreshStats> {
        let started = Instant::now();
        let result = self.rebuild();
        self.metrics.record_refresh(started.elapsed(), result.is_ok());
        result
    }

    fn rebuild(&self) -> FilterResult<RefreshStats> {
        let patterns: BTreeSet<String> = self.source.get_patterns()?.into_iter().collect();

        let mut globs = Vec::new();
        let mut predicates = Vec::new();
        let mut invalid = HashSet::new();
        let mut newly_skipped = 0usize;
        {
            let mut reported = self
                .reported_invalid
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for raw in &patterns {
                match CompiledPattern::compile(raw) {
                    Ok(CompiledPattern::Glob(glob)) => globs.push(glob),
                    Ok(CompiledPattern::TagPredicate(predicate)) => predicates.push(predicate),
                    Err(e) => {
                        if reported.contains(raw) {
                            tracing::debug!(pattern = %raw, error = %e, "skipping invalid pattern");
                        } else {
                            newly_skipped += 1;
                            tracing::warn!(pattern = %raw, error = %e, "skipping invalid pattern");
                        }
                        invalid.insert(raw.clone());
                    }
                }
            }
            *reported = invalid;
        }
        let skipped = patterns.len() - globs.len() - predicates.len();

        let stats = RefreshStats {
            glob_patterns: globs.len(),
            tagged_patterns: predicates.len(),
            skipped_patterns: skipped,
            newly_skipped,
        };

        self.glob_index.store(Arc::new(GlobIndex::build(globs)));
        self.tag_index.store(Arc::new(TagIndex::build(predicates)));
        self.metrics.record_skipped_patterns(u64::try_from(skipped).unwrap_or(u64::MAX));

        tracing::debug!(
            glob = stats.glob_patterns,
            tagged = stats.tagged_patterns,
            skipped = stats.skipped_patterns,
            "pattern indexes refreshed"
        );
        Ok(stats)
    }

    /// Parses one metric line and matches it against the current indexes.
    ///
    /// Returns `None` for unparsable lines, metrics older than
    /// `max_retention_age`, and metrics that match no pattern. Each outcome is
    /// counted in [`FilterMetrics`].
    pub fn process_incoming_metric(
        &self,
        line: &str,
        max_retention_age: Duration,
    ) -> Option<MatchedMetric> {
        self.metrics.record_received();
        let now = self.clock.now_unix();

        let parsed = match parse_metric_at(line, now) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.metrics.record_parse_error();
                tracing::debug!(error = %e, "cannot parse metric");
                return None;
            }
        };

        if parsed.is_too_old(max_retention_age, now) {
            self.metrics.record_too_old();
            tracing::debug!(
                metric = %parsed.metric,
                timestamp = parsed.timestamp,
                "metric is too old"
            );
            return None;
        }

        let valid = self.metrics.record_valid();
        let patterns = if valid % self.config.matching_timer_sample_rate.max(1) == 0 {
            let started = Instant::now();
            let patterns = self.match_patterns(&parsed);
            self.metrics.matching_timer().record(started.elapsed());
            patterns
        } else {
            self.match_patterns(&parsed)
        };

        if patterns.is_empty() {
            return None;
        }
        self.metrics.record_matched();
        Some(MatchedMetric::new(parsed, patterns, self.config.default_retention_secs))
    }

    /// Same as [`PatternStorage::process_incoming_metric`] with the configured
    /// retention age.
    pub fn process(&self, line: &str) -> Option<MatchedMetric> {
        self.process_incoming_metric(line, self.config.max_retention_age())
    }

    /// Matches an already parsed metric. Tagged metrics go to the
    /// tag-predicate index, untagged ones to the glob index.
    #[must_use]
    pub fn match_patterns(&self, metric: &ParsedMetric) -> Vec<String> {
        if metric.is_tagged() {
            self.tag_index.load().match_patterns(&metric.name, &metric.labels)
        } else {
            self.glob_index.load().match_patterns(&metric.name)
        }
    }

    /// Currently published glob index.
    #[must_use]
    pub fn glob_index(&self) -> Arc<GlobIndex> {
        self.glob_index.load_full()
    }

    /// Currently published tag-predicate index.
    #[must_use]
    pub fn tag_index(&self) -> Arc<TagIndex> {
        self.tag_index.load_full()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Live counters and timers.
    #[must_use]
    pub const fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }

    /// Index sizes and a copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            glob_patterns: self.glob_index.load().len(),
            tagged_patterns: self.tag_index.load().len(),
            metrics: self.metrics.snapshot(),
        }
    }
}
