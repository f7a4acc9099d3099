//! Metric line parsing and the matched-metric output record.
//!
//! A metric line is `name value timestamp`, separated by single spaces. The
//! name field may carry a label list: `cpu.load;dc=ru1;host=web01`. A metric
//! with at least one label is *tagged* and is matched against `seriesByTag`
//! patterns; a bare dotted path is matched against glob patterns.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Timestamp value meaning "use the receive time".
const TIMESTAMP_NOW: f64 = -1.0;

/// A single parsed metric line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMetric {
    /// The full name field as received, labels included.
    pub metric: String,
    /// Dotted path before the first `;`.
    pub name: String,
    /// Label map; empty for untagged metrics.
    pub labels: HashMap<String, String>,
    /// Sample value.
    pub value: f64,
    /// Sample time, Unix seconds.
    pub timestamp: i64,
}

impl ParsedMetric {
    /// Returns true when the metric carries an embedded label list.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.labels.is_empty()
    }

    /// Returns true when `timestamp < now - retention_window`.
    #[must_use]
    pub fn is_too_old(&self, retention_window: Duration, now_unix: i64) -> bool {
        let window = i64::try_from(retention_window.as_secs()).unwrap_or(i64::MAX);
        self.timestamp < now_unix.saturating_sub(window)
    }
}

/// Parses a metric line, resolving a `-1` timestamp against the system clock.
///
/// # Errors
///
/// Returns `ParseError` if the line has the wrong token count, a malformed
/// label, a non-numeric value or timestamp, or non-printable characters.
///
/// # Examples
///
/// ```
/// use kyro_filter::metric::parse_metric;
///
/// let m = parse_metric("cpu.user;dc=ru1 12.5 1700000000").unwrap();
/// assert_eq!(m.name, "cpu.user");
/// assert!(m.is_tagged());
/// assert_eq!(m.labels["dc"], "ru1");
/// ```
pub fn parse_metric(line: &str) -> Result<ParsedMetric, ParseError> {
    parse_metric_at(line, Utc::now().timestamp())
}

/// Parses a metric line, resolving a `-1` timestamp to `now_unix`.
///
/// # Errors
///
/// See [`parse_metric`].
pub fn parse_metric_at(line: &str, now_unix: i64) -> Result<ParsedMetric, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(ParseError::NonPrintable {
            line: line.to_string(),
        });
    }

    let mut tokens = line.split(' ');
    let (Some(metric), Some(value), Some(timestamp)) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ParseError::TooFewItems {
            line: line.to_string(),
        });
    };
    if tokens.next().is_some() {
        return Err(ParseError::TooManyItems {
            line: line.to_string(),
        });
    }

    let (name, labels) = parse_name_and_labels(metric, line)?;

    let value: f64 = value.parse().map_err(|e: std::num::ParseFloatError| {
        ParseError::InvalidValue {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;

    let raw_ts: f64 = timestamp.parse().map_err(|e: std::num::ParseFloatError| {
        ParseError::InvalidTimestamp {
            timestamp: timestamp.to_string(),
            reason: e.to_string(),
        }
    })?;
    #[allow(clippy::float_cmp)]
    let timestamp = if raw_ts == TIMESTAMP_NOW {
        now_unix
    } else {
        to_unix_secs(raw_ts).ok_or_else(|| ParseError::InvalidTimestamp {
            timestamp: timestamp.to_string(),
            reason: "out of range".to_string(),
        })?
    };

    Ok(ParsedMetric {
        metric: metric.to_string(),
        name,
        labels,
        value,
        timestamp,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_unix_secs(raw: f64) -> Option<i64> {
    if !raw.is_finite() || raw.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(raw.trunc() as i64)
}

fn parse_name_and_labels(
    metric: &str,
    line: &str,
) -> Result<(String, HashMap<String, String>), ParseError> {
    let mut parts = metric.split(';');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(ParseError::EmptyName {
            line: line.to_string(),
        });
    }

    let mut labels = HashMap::new();
    for label in parts {
        match label.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                labels.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(ParseError::InvalidLabel {
                    metric: metric.to_string(),
                    label: label.to_string(),
                });
            }
        }
    }

    Ok((name.to_string(), labels))
}

/// A metric together with every registered pattern it satisfied.
///
/// Produced by the filter and handed to the downstream persistence
/// collaborator, which owns it from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedMetric {
    /// Full metric name field, labels included.
    pub metric: String,
    /// Matched pattern strings.
    pub patterns: Vec<String>,
    /// Sample value.
    pub value: f64,
    /// Sample time, Unix seconds.
    pub timestamp: i64,
    /// Timestamp aligned for retention bookkeeping.
    pub retention_timestamp: i64,
    /// Retention step in seconds.
    pub retention: i64,
}

impl MatchedMetric {
    /// Builds the record for a parsed metric and its matches.
    #[must_use]
    pub fn new(parsed: ParsedMetric, patterns: Vec<String>, retention: i64) -> Self {
        Self {
            metric: parsed.metric,
            patterns,
            value: parsed.value,
            timestamp: parsed.timestamp,
            retention_timestamp: parsed.timestamp,
            retention,
        }
    }
}
