//! # kyro-filter - metric subscription matching
//!
//! kyro-filter sits between metric ingestion and persistence in a monitoring
//! pipeline. Every incoming metric line is parsed, checked for staleness and
//! matched against the set of registered subscription patterns. Only metrics
//! that satisfy at least one pattern are passed on.
//!
//! ## Core Concepts
//!
//! - **Glob pattern**: a dotted path with wildcards, `servers.*.cpu.{user,system}`
//! - **Tag predicate**: a `seriesByTag('name=cpu', 'dc=~ru.*')` expression;
//!   all of its tag specs must hold
//! - **Index generation**: an immutable compiled index, republished
//!   wholesale on every refresh
//! - **MatchedMetric**: a metric with the patterns it satisfied
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use kyro_filter::{FilterConfig, InMemoryPatternStore, PatternStorage, RefreshWorker};
//!
//! let store = Arc::new(InMemoryPatternStore::with_patterns([
//!     "servers.*.cpu",
//!     "seriesByTag('name=disk', 'dc=ru1')",
//! ]));
//! let storage = Arc::new(PatternStorage::open(store.clone(), FilterConfig::default())?);
//! let worker = RefreshWorker::start(Arc::clone(&storage), Duration::from_secs(1))?;
//!
//! let matched = storage
//!     .process_incoming_metric("servers.web01.cpu 0.5 -1", Duration::from_secs(3600))
//!     .expect("metric matches");
//! assert_eq!(matched.patterns, vec!["servers.*.cpu"]);
//!
//! worker.stop();
//! # Ok::<(), kyro_filter::FilterError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Parsing and compilation
pub mod error;
pub mod metric;
pub mod pattern;
pub mod time;

// Indexes and matching
pub mod config;
pub mod filter;
pub mod index;
pub mod refresh;
pub mod storage;

pub use config::FilterConfig;
pub use error::{
    FilterError, FilterResult, GlobError, ParseError, PatternError, TagSpecError, ValidationError,
};
pub use filter::{FilterMetrics, FilterSnapshot, PatternStorage, RefreshStats};
pub use index::{GlobIndex, TagIndex};
pub use metric::{parse_metric, MatchedMetric, ParsedMetric};
pub use pattern::{CompiledPattern, GlobPattern, TagOperator, TagPredicate, TagSpec};
pub use refresh::RefreshWorker;
pub use storage::{InMemoryPatternStore, PatternSource, StorageError};
pub use time::{Clock, FixedClock, SystemClock};
