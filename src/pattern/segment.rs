//! Dotted glob patterns.
//!
//! A glob pattern is split on `.` into segments. Each segment matches exactly
//! one segment of a metric name; there is no multi-level wildcard.
//!
//! | Segment | Kind | Matches |
//! |---|---|---|
//! | `cpu` | literal | `cpu` only |
//! | `*` | any | every segment |
//! | `{user,system}` | alternation | `user` or `system` |
//! | `cpu*`, `host-?`, `[ab]x`, `web{1,2}` | partial | the equivalent anchored regex |

use std::fmt;

use regex::Regex;

use crate::error::GlobError;

/// How a single segment matches.
#[derive(Debug, Clone)]
pub enum SegmentKind {
    /// Exact text.
    Literal(String),
    /// `*`: any single segment.
    Any,
    /// `{a,b,c}`: any of the listed literals.
    Alternation(Vec<String>),
    /// Literal text mixed with wildcard syntax, compiled to `^...$`.
    Partial(Regex),
}

/// One compiled glob segment together with its source text.
#[derive(Debug, Clone)]
pub struct Segment {
    source: String,
    kind: SegmentKind,
}

impl Segment {
    /// Compiles a single segment.
    ///
    /// # Errors
    ///
    /// Returns `GlobError` for unbalanced `{`/`[` or a segment whose
    /// translated regex does not compile.
    pub fn parse(source: &str) -> Result<Self, GlobError> {
        let kind = if source == "*" {
            SegmentKind::Any
        } else if !has_glob_syntax(source) {
            SegmentKind::Literal(source.to_string())
        } else if let Some(alternatives) = plain_alternation(source) {
            SegmentKind::Alternation(alternatives)
        } else {
            let pattern = format!("^{}$", translate(source)?);
            let regex = Regex::new(&pattern).map_err(|e| GlobError::InvalidSegment {
                segment: source.to_string(),
                reason: e.to_string(),
            })?;
            SegmentKind::Partial(regex)
        };

        Ok(Self {
            source: source.to_string(),
            kind,
        })
    }

    /// Source text of the segment, used as the trie key.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled matching rule.
    #[must_use]
    pub const fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    /// Returns true for a literal segment.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self.kind, SegmentKind::Literal(_))
    }

    /// Tests one metric-name segment.
    #[must_use]
    pub fn matches(&self, part: &str) -> bool {
        match &self.kind {
            SegmentKind::Literal(text) => text == part,
            SegmentKind::Any => true,
            SegmentKind::Alternation(alternatives) => alternatives.iter().any(|a| a == part),
            SegmentKind::Partial(regex) => regex.is_match(part),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A compiled dotted glob pattern.
///
/// # Examples
///
/// ```
/// use kyro_filter::pattern::GlobPattern;
///
/// let glob = GlobPattern::parse("servers.*.cpu.{user,system}").unwrap();
/// assert!(glob.matches("servers.web01.cpu.user"));
/// assert!(!glob.matches("servers.web01.cpu"));
/// ```
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl GlobPattern {
    /// Compiles a dotted glob pattern.
    ///
    /// # Errors
    ///
    /// Returns `GlobError::Empty` for an empty string, `EmptySegment` for
    /// `a..b` or a trailing dot, and segment errors from [`Segment::parse`].
    pub fn parse(raw: &str) -> Result<Self, GlobError> {
        if raw.is_empty() {
            return Err(GlobError::Empty);
        }

        let segments = raw
            .split('.')
            .enumerate()
            .map(|(position, part)| {
                if part.is_empty() {
                    Err(GlobError::EmptySegment {
                        pattern: raw.to_string(),
                        position,
                    })
                } else {
                    Segment::parse(part)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as registered.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Compiled segments in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true when every segment is a literal.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(Segment::is_literal)
    }

    /// Matches a full metric name segment by segment.
    ///
    /// This is the reference semantics the trie index must reproduce.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let mut parts = name.split('.');
        for segment in &self.segments {
            match parts.next() {
                Some(part) if segment.matches(part) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn has_glob_syntax(source: &str) -> bool {
    source.contains(['*', '?', '[', ']', '{', '}'])
}

/// `{a,b,c}` with literal alternatives only.
fn plain_alternation(source: &str) -> Option<Vec<String>> {
    let inner = source.strip_prefix('{')?.strip_suffix('}')?;
    if has_glob_syntax(inner) {
        return None;
    }
    Some(inner.split(',').map(str::to_string).collect())
}

/// Translates glob syntax to an unanchored regex body.
fn translate(source: &str) -> Result<String, GlobError> {
    let unbalanced = |delimiter| GlobError::Unbalanced {
        segment: source.to_string(),
        delimiter,
    };

    let mut out = String::with_capacity(source.len() * 2);
    let mut chars = source.chars().peekable();
    let mut brace_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        out.push('\\');
                    }
                    out.push(inner);
                }
                if !closed {
                    return Err(unbalanced('['));
                }
                out.push(']');
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' => {
                if brace_depth == 0 {
                    return Err(unbalanced('}'));
                }
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            ']' => return Err(unbalanced(']')),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    if brace_depth > 0 {
        return Err(unbalanced('{'));
    }
    Ok(out)
}
