//! Error types for kyro-filter.
//!
//! All errors are strongly typed using thiserror so callers can tell a
//! dropped metric from a skipped pattern from a failed refresh.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors produced while parsing a single metric line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("non-ascii or non-printable chars in metric line: '{line}'")]
    NonPrintable { line: String },

    #[error("too few space-separated items: '{line}'")]
    TooFewItems { line: String },

    #[error("too many space-separated items: '{line}'")]
    TooManyItems { line: String },

    #[error("empty metric name: '{line}'")]
    EmptyName { line: String },

    #[error("cannot parse label '{label}' in metric '{metric}'")]
    InvalidLabel { metric: String, label: String },

    #[error("cannot parse value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    #[error("cannot parse timestamp '{timestamp}': {reason}")]
    InvalidTimestamp { timestamp: String, reason: String },
}

/// Errors produced while compiling a `seriesByTag(...)` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagSpecError {
    /// The input is not a `seriesByTag` expression. Callers retry it as a glob.
    #[error("not seriesByTag pattern")]
    NotSeriesByTag,

    #[error("invalid regex '{value}' for tag '{tag}': {reason}")]
    InvalidRegex {
        tag: String,
        value: String,
        reason: String,
    },
}

impl TagSpecError {
    /// Returns true if this is the "retry as glob" signal rather than a failure.
    #[must_use]
    pub const fn is_not_series_by_tag(&self) -> bool {
        matches!(self, Self::NotSeriesByTag)
    }
}

/// Errors produced while compiling a dotted glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobError {
    #[error("pattern is empty")]
    Empty,

    #[error("empty segment at position {position} in '{pattern}'")]
    EmptySegment { pattern: String, position: usize },

    #[error("unbalanced '{delimiter}' in segment '{segment}'")]
    Unbalanced { segment: String, delimiter: char },

    #[error("cannot compile segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: String },
}

/// Errors produced while compiling any registered pattern string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("{0}")]
    TagSpec(#[from] TagSpecError),

    #[error("{0}")]
    Glob(#[from] GlobError),
}

/// Validation errors for configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' must be greater than zero")]
    MustBePositive { field: String },
}

/// Top-level error type for kyro-filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FilterError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the pattern source.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Only pattern source failures are transient; bad input stays bad.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for kyro-filter operations.
pub type FilterResult<T> = Result<T, FilterError>;
