//! Subscription patterns.
//!
//! A registered pattern string compiles, once, into one of two variants:
//! a `seriesByTag(...)` tag predicate or a dotted glob. Classification tries
//! the tag grammar first; anything that is not a `seriesByTag` expression is
//! compiled as a glob.

use std::fmt;

use crate::error::{PatternError, TagSpecError};

pub mod segment;
pub mod series_by_tag;

pub use segment::{GlobPattern, Segment, SegmentKind};
pub use series_by_tag::{
    parse_series_by_tag, TagMatcher, TagOperator, TagPredicate, TagSpec, NAME_TAG,
};

/// A compiled subscription pattern.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// Dotted wildcard pattern, matched against untagged metrics.
    Glob(GlobPattern),
    /// AND of tag specs, matched against tagged metrics.
    TagPredicate(TagPredicate),
}

impl CompiledPattern {
    /// Compiles a raw pattern string.
    ///
    /// # Errors
    ///
    /// `PatternError::TagSpec` for a `seriesByTag` expression whose regex
    /// values do not compile, `PatternError::Glob` for a malformed glob.
    ///
    /// # Examples
    ///
    /// ```
    /// use kyro_filter::pattern::CompiledPattern;
    ///
    /// assert!(CompiledPattern::compile("seriesByTag('dc=ru1')").unwrap().is_tag_predicate());
    /// assert!(!CompiledPattern::compile("servers.*.cpu").unwrap().is_tag_predicate());
    /// ```
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        match TagPredicate::parse(raw) {
            Ok(predicate) => Ok(Self::TagPredicate(predicate)),
            Err(TagSpecError::NotSeriesByTag) => Ok(Self::Glob(GlobPattern::parse(raw)?)),
            Err(e) => Err(e.into()),
        }
    }

    /// The pattern as registered.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Glob(glob) => glob.raw(),
            Self::TagPredicate(predicate) => predicate.raw(),
        }
    }

    /// Returns true for the `seriesByTag` variant.
    #[must_use]
    pub const fn is_tag_predicate(&self) -> bool {
        matches!(self, Self::TagPredicate(_))
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob(_) => write!(f, "glob({})", self.raw()),
            Self::TagPredicate(_) => write!(f, "tag({})", self.raw()),
        }
    }
}
