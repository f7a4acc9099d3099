//! Filter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tuning knobs for [`crate::filter::PatternStorage`] and
/// [`crate::refresh::RefreshWorker`].
///
/// Missing fields take their defaults when deserializing:
///
/// ```
/// use kyro_filter::config::FilterConfig;
///
/// let cfg: FilterConfig = serde_json::from_str(r#"{"refresh_interval_ms": 250}"#).unwrap();
/// assert_eq!(cfg.refresh_interval_ms, 250);
/// assert_eq!(cfg.max_retention_age_secs, 3600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Period between pattern refreshes.
    pub refresh_interval_ms: u64,
    /// Metrics older than this, relative to now, are dropped.
    pub max_retention_age_secs: u64,
    /// Retention step stamped on every matched metric.
    pub default_retention_secs: i64,
    /// Time one in every N matches.
    pub matching_timer_sample_rate: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            max_retention_age_secs: 3600,
            default_retention_secs: 60,
            matching_timer_sample_rate: 10,
        }
    }
}

impl FilterConfig {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MustBePositive` for a zero interval, age,
    /// retention or sample rate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive = [
            ("refresh_interval_ms", self.refresh_interval_ms > 0),
            ("max_retention_age_secs", self.max_retention_age_secs > 0),
            ("default_retention_secs", self.default_retention_secs > 0),
            ("matching_timer_sample_rate", self.matching_timer_sample_rate > 0),
        ];
        for (field, ok) in positive {
            if !ok {
                return Err(ValidationError::MustBePositive {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// `refresh_interval_ms` as a `Duration`.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// `max_retention_age_secs` as a `Duration`.
    #[must_use]
    pub const fn max_retention_age(&self) -> Duration {
        Duration::from_secs(self.max_retention_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FilterConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(1));
        assert_eq!(cfg.max_retention_age(), Duration::from_secs(3600));
        assert_eq!(cfg.default_retention_secs, 60);
        assert_eq!(cfg.matching_timer_sample_rate, 10);
    }

    #[test]
    fn zero_fields_are_rejected() {
        let cfg = FilterConfig {
            matching_timer_sample_rate: 0,
            ..FilterConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ValidationError::MustBePositive {
                field: "matching_timer_sample_rate".to_string()
            })
        );

        let cfg = FilterConfig {
            default_retention_secs: -5,
            ..FilterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_partial_documents() {
        let cfg: FilterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, FilterConfig::default());

        let json = serde_json::to_string(&cfg).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
