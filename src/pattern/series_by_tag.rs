//! `seriesByTag(...)` patterns.
//!
//! Grammar: `seriesByTag(<quoted-spec>(,<quoted-spec>)*)` where every spec is
//! `name OP value` wrapped in matching single or double quotes and
//! `OP ∈ {=, !=, =~, !=~}`. Brace groups inside a value (`{a,b,c}`) become
//! the regex `(a|b|c)$` and turn an equality into a regex test.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::TagSpecError;
use crate::pattern::segment::GlobPattern;

const PREFIX: &str = "seriesByTag(";
const SUFFIX: char = ')';

/// Tag that refers to the metric's dotted path rather than a label.
pub const NAME_TAG: &str = "name";

/// Comparison operator of a tag spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagOperator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `=~`
    Match,
    /// `!=~`
    NotMatch,
}

impl TagOperator {
    /// Operator token as written in a pattern.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Match => "=~",
            Self::NotMatch => "!=~",
        }
    }
}

impl fmt::Display for TagOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `name OP value` filter of a `seriesByTag` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSpec {
    /// Tag name; `name` addresses the metric path.
    pub name: String,
    /// Comparison operator.
    pub operator: TagOperator,
    /// Literal for Eq/NotEq, regex body for Match/NotMatch.
    pub value: String,
}

impl TagSpec {
    /// Creates a tag spec.
    #[must_use]
    pub fn new(name: impl Into<String>, operator: TagOperator, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
        }
    }
}

impl fmt::Display for TagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.operator, self.value)
    }
}

/// Parses a `seriesByTag(...)` expression into its tag specs.
///
/// # Errors
///
/// Returns `TagSpecError::NotSeriesByTag` for anything that does not follow
/// the grammar, including mismatched quotes. Callers treat that as "this is a
/// glob pattern".
///
/// # Examples
///
/// ```
/// use kyro_filter::pattern::{parse_series_by_tag, TagOperator, TagSpec};
///
/// let specs = parse_series_by_tag("seriesByTag('a={b,c,d}')").unwrap();
/// assert_eq!(specs, vec![TagSpec::new("a", TagOperator::Match, "(b|c|d)$")]);
/// ```
pub fn parse_series_by_tag(input: &str) -> Result<Vec<TagSpec>, TagSpecError> {
    let body = input
        .strip_prefix(PREFIX)
        .and_then(|s| s.strip_suffix(SUFFIX))
        .ok_or(TagSpecError::NotSeriesByTag)?;
    if body.is_empty() || body.contains(SUFFIX) {
        return Err(TagSpecError::NotSeriesByTag);
    }

    let mut specs = Vec::new();
    let mut rest = body;
    loop {
        let end = spec_end(rest);
        specs.push(parse_quoted_spec(&rest[..end])?);
        rest = &rest[end..];
        if rest.is_empty() {
            break;
        }
        // `rest` starts with the separating comma.
        rest = rest[1..].trim_start();
        if rest.is_empty() {
            return Err(TagSpecError::NotSeriesByTag);
        }
    }
    Ok(specs)
}

/// Byte offset of the first comma outside a brace group, or the input length.
///
/// Braces only nest inside the current quoted spec; the closing quote ends
/// any group left open, so an unterminated `{` never swallows later specs.
fn spec_end(input: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(open), _) if c == open => {
                quote = None;
                depth = 0;
            }
            (Some(_), '{') => depth += 1,
            (Some(_), '}') => depth = depth.saturating_sub(1),
            (_, ',') if depth == 0 => return idx,
            _ => {}
        }
    }
    input.len()
}

fn parse_quoted_spec(quoted: &str) -> Result<TagSpec, TagSpecError> {
    let quoted = quoted.trim_end();
    let mut chars = quoted.chars();
    let (Some(open), Some(close)) = (chars.next(), chars.next_back()) else {
        return Err(TagSpecError::NotSeriesByTag);
    };
    if !matches!(open, '"' | '\'') || open != close {
        return Err(TagSpecError::NotSeriesByTag);
    }
    let inner = chars.as_str();

    let op_start = inner.find(['!', '=']).ok_or(TagSpecError::NotSeriesByTag)?;
    let name = inner[..op_start].trim();
    if name.is_empty() {
        return Err(TagSpecError::NotSeriesByTag);
    }

    let after_name = &inner[op_start..];
    let (operator, value) = [
        ("!=~", TagOperator::NotMatch),
        ("!=", TagOperator::NotEq),
        ("=~", TagOperator::Match),
        ("=", TagOperator::Eq),
    ]
    .into_iter()
    .find_map(|(token, op)| after_name.strip_prefix(token).map(|v| (op, v)))
    .ok_or(TagSpecError::NotSeriesByTag)?;
    let value = value.trim_start();

    Ok(expand_braces(TagSpec::new(name, operator, value)))
}

/// Rewrites every `{a,b,c}` group to `(a|b|c)$` and turns the spec into a
/// regex test.
fn expand_braces(spec: TagSpec) -> TagSpec {
    if !spec.value.contains('{') {
        return spec;
    }

    let mut value = String::with_capacity(spec.value.len() + 8);
    let mut rest = spec.value.as_str();
    let mut rewritten = false;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        value.push_str(&rest[..open]);
        value.push('(');
        let alternatives: Vec<&str> = rest[open + 1..close].split(',').map(str::trim).collect();
        value.push_str(&alternatives.join("|"));
        value.push_str(")$");
        rest = &rest[close + 1..];
        rewritten = true;
    }
    value.push_str(rest);

    if !rewritten {
        return spec;
    }

    let operator = match spec.operator {
        TagOperator::Eq | TagOperator::Match => TagOperator::Match,
        TagOperator::NotEq | TagOperator::NotMatch => TagOperator::NotMatch,
    };
    TagSpec {
        name: spec.name,
        operator,
        value,
    }
}

#[derive(Debug, Clone)]
enum Condition {
    Equal(String),
    NotEqual(String),
    /// `name=<glob>`: the metric path is tested the way the glob index would.
    NameGlob(GlobPattern),
    Match(Regex),
    NotMatch(Regex),
}

impl Condition {
    fn test(&self, value: &str) -> bool {
        match self {
            Self::Equal(expected) => value == expected,
            Self::NotEqual(expected) => value != expected,
            Self::NameGlob(glob) => glob.matches(value),
            Self::Match(regex) => regex.is_match(value),
            Self::NotMatch(regex) => !regex.is_match(value),
        }
    }
}

/// A tag spec compiled to a predicate over `(name, labels)`.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    spec: TagSpec,
    condition: Condition,
    /// Result when the label is absent.
    match_missing: bool,
}

impl TagMatcher {
    /// Compiles a spec. Regexes are built here, once.
    ///
    /// # Errors
    ///
    /// Returns `TagSpecError::InvalidRegex` if a Match/NotMatch value is not
    /// a valid regex.
    pub fn compile(spec: TagSpec) -> Result<Self, TagSpecError> {
        let anchored = |value: &str| {
            Regex::new(&format!("^{value}")).map_err(|e| TagSpecError::InvalidRegex {
                tag: spec.name.clone(),
                value: value.to_string(),
                reason: e.to_string(),
            })
        };

        let condition = match spec.operator {
            TagOperator::Eq if spec.name == NAME_TAG && !spec.value.is_empty() => {
                match GlobPattern::parse(&spec.value) {
                    Ok(glob) if !glob.is_literal() => Condition::NameGlob(glob),
                    _ => Condition::Equal(spec.value.clone()),
                }
            }
            TagOperator::Eq => Condition::Equal(spec.value.clone()),
            TagOperator::NotEq => Condition::NotEqual(spec.value.clone()),
            TagOperator::Match => Condition::Match(anchored(&spec.value)?),
            TagOperator::NotMatch => Condition::NotMatch(anchored(&spec.value)?),
        };

        let fallback_allowed = matches!(spec.operator, TagOperator::Eq | TagOperator::Match);
        let match_missing = fallback_allowed && condition.test("");

        Ok(Self {
            spec,
            condition,
            match_missing,
        })
    }

    /// The source spec.
    #[must_use]
    pub const fn spec(&self) -> &TagSpec {
        &self.spec
    }

    /// Returns true for a `name=<value>` spec with a non-empty value.
    #[must_use]
    pub fn is_name_equality(&self) -> bool {
        self.spec.name == NAME_TAG
            && self.spec.operator == TagOperator::Eq
            && !self.spec.value.is_empty()
    }

    /// Evaluates the spec against a metric.
    #[must_use]
    pub fn matches(&self, name: &str, labels: &HashMap<String, String>) -> bool {
        if self.spec.name == NAME_TAG {
            return self.condition.test(name);
        }
        match labels.get(&self.spec.name) {
            Some(value) => self.condition.test(value),
            None => self.match_missing,
        }
    }
}

/// A compiled `seriesByTag` pattern: the AND of its tag matchers.
#[derive(Debug, Clone)]
pub struct TagPredicate {
    raw: String,
    matchers: Vec<TagMatcher>,
}

impl TagPredicate {
    /// Compiles parsed specs.
    ///
    /// # Errors
    ///
    /// Propagates `TagSpecError::InvalidRegex` from any spec.
    pub fn compile(raw: impl Into<String>, specs: Vec<TagSpec>) -> Result<Self, TagSpecError> {
        let matchers = specs
            .into_iter()
            .map(TagMatcher::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: raw.into(),
            matchers,
        })
    }

    /// Parses and compiles a pattern string.
    ///
    /// # Errors
    ///
    /// `NotSeriesByTag` if the string is not a `seriesByTag` expression,
    /// `InvalidRegex` if it is but a regex value does not compile.
    pub fn parse(raw: &str) -> Result<Self, TagSpecError> {
        let specs = parse_series_by_tag(raw)?;
        Self::compile(raw, specs)
    }

    /// The pattern as registered.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Compiled matchers in spec order.
    #[must_use]
    pub fn matchers(&self) -> &[TagMatcher] {
        &self.matchers
    }

    /// Value of the first `name=<value>` spec, used to place the pattern in
    /// the name trie.
    #[must_use]
    pub fn name_equality(&self) -> Option<&str> {
        self.matchers
            .iter()
            .find(|m| m.is_name_equality())
            .map(|m| m.spec().value.as_str())
    }

    /// True iff every spec holds.
    #[must_use]
    pub fn matches(&self, name: &str, labels: &HashMap<String, String>) -> bool {
        self.matchers.iter().all(|m| m.matches(name, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_valid_patterns() {
        let cases: Vec<(&str, Vec<TagSpec>)> = vec![
            ("seriesByTag('a=b')", vec![TagSpec::new("a", TagOperator::Eq, "b")]),
            ("seriesByTag(\"a=b\")", vec![TagSpec::new("a", TagOperator::Eq, "b")]),
            ("seriesByTag(\"a!=b\")", vec![TagSpec::new("a", TagOperator::NotEq, "b")]),
            ("seriesByTag(\"a=~b\")", vec![TagSpec::new("a", TagOperator::Match, "b")]),
            ("seriesByTag(\"a!=~b\")", vec![TagSpec::new("a", TagOperator::NotMatch, "b")]),
            ("seriesByTag(\"a=\")", vec![TagSpec::new("a", TagOperator::Eq, "")]),
            (
                "seriesByTag(\"a=b\",\"a=c\")",
                vec![
                    TagSpec::new("a", TagOperator::Eq, "b"),
                    TagSpec::new("a", TagOperator::Eq, "c"),
                ],
            ),
            (
                "seriesByTag(\"a=b\", 'b=c' ,  \"c=d\")",
                vec![
                    TagSpec::new("a", TagOperator::Eq, "b"),
                    TagSpec::new("b", TagOperator::Eq, "c"),
                    TagSpec::new("c", TagOperator::Eq, "d"),
                ],
            ),
            (
                "seriesByTag(\"a={b,c,d}\")",
                vec![TagSpec::new("a", TagOperator::Match, "(b|c|d)$")],
            ),
            (
                "seriesByTag('a={b', 'c=d')",
                vec![
                    TagSpec::new("a", TagOperator::Eq, "{b"),
                    TagSpec::new("c", TagOperator::Eq, "d"),
                ],
            ),
            (
                "seriesByTag('a=x{b,c', \"d={e,f}\")",
                vec![
                    TagSpec::new("a", TagOperator::Eq, "x{b,c"),
                    TagSpec::new("d", TagOperator::Match, "(e|f)$"),
                ],
            ),
        ];

        for (pattern, expected) in cases {
            assert_eq!(parse_series_by_tag(pattern).unwrap(), expected, "{pattern}");
        }
    }

    #[test]
    fn rejects_invalid_patterns() {
        for pattern in [
            "seriesByTag(\"a=b')",
            "seriesByTag('a=b\")",
            "seriesByTag()",
            "seriesByTag('a=b'",
            "seriesByTag('a=b',)",
            "seriesByTag('=b')",
            "seriesByTag('ab')",
            "seriesByTag(a=b)",
            "seriesByTag('a=b') ",
            "my.metric.*",
            "",
        ] {
            assert_eq!(
                parse_series_by_tag(pattern),
                Err(TagSpecError::NotSeriesByTag),
                "{pattern}"
            );
        }
    }

    #[test]
    fn expands_brace_groups() {
        let specs = parse_series_by_tag(
            "seriesByTag('responseCode={405,406,407}', 'returnValue={1, 2, 3}', 'a=b')",
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                TagSpec::new("responseCode", TagOperator::Match, "(405|406|407)$"),
                TagSpec::new("returnValue", TagOperator::Match, "(1|2|3)$"),
                TagSpec::new("a", TagOperator::Eq, "b"),
            ]
        );

        let specs = parse_series_by_tag("seriesByTag('dc!={ru1,ru2}')").unwrap();
        assert_eq!(specs, vec![TagSpec::new("dc", TagOperator::NotMatch, "(ru1|ru2)$")]);
    }

    #[test]
    fn invalid_regex_is_a_compile_error_not_a_fallback() {
        let err = TagPredicate::parse("seriesByTag('dc=~(ru')").unwrap_err();
        assert!(matches!(err, TagSpecError::InvalidRegex { .. }));
        assert!(!err.is_not_series_by_tag());
    }

    #[test]
    fn operators_evaluate_against_labels() {
        let eq = TagMatcher::compile(TagSpec::new("dc", TagOperator::Eq, "ru1")).unwrap();
        let ne = TagMatcher::compile(TagSpec::new("dc", TagOperator::NotEq, "ru1")).unwrap();
        let re = TagMatcher::compile(TagSpec::new("dc", TagOperator::Match, "ru")).unwrap();
        let nre = TagMatcher::compile(TagSpec::new("dc", TagOperator::NotMatch, "ru")).unwrap();

        let ru1 = labels(&[("dc", "ru1")]);
        let us = labels(&[("dc", "us")]);
        let none = labels(&[]);

        assert!(eq.matches("m", &ru1) && !eq.matches("m", &us) && !eq.matches("m", &none));
        assert!(!ne.matches("m", &ru1) && ne.matches("m", &us) && !ne.matches("m", &none));
        assert!(re.matches("m", &ru1) && !re.matches("m", &us) && !re.matches("m", &none));
        assert!(!nre.matches("m", &ru1) && nre.matches("m", &us) && !nre.matches("m", &none));
    }

    #[test]
    fn regex_is_start_anchored() {
        let re = TagMatcher::compile(TagSpec::new("dc", TagOperator::Match, "ru")).unwrap();
        assert!(!re.matches("m", &labels(&[("dc", "xru")])));
    }

    #[test]
    fn missing_label_falls_back_to_empty_for_eq_and_match_only() {
        let none = labels(&[]);
        let empty = labels(&[("dc", "")]);
        for (op, missing) in [
            (TagOperator::Eq, true),
            (TagOperator::Match, true),
            (TagOperator::NotEq, false),
            (TagOperator::NotMatch, false),
        ] {
            let m = TagMatcher::compile(TagSpec::new("dc", op, "")).unwrap();
            assert_eq!(m.matches("m", &none), missing, "{op} on missing label");
            assert_eq!(m.matches("m", &empty), missing, "{op} on empty label");
        }
    }

    #[test]
    fn name_tag_tests_metric_path() {
        let exact = TagMatcher::compile(TagSpec::new("name", TagOperator::Eq, "cpu1")).unwrap();
        assert!(exact.matches("cpu1", &labels(&[])));
        assert!(!exact.matches("cpu11", &labels(&[])));
        assert!(exact.is_name_equality());

        let glob =
            TagMatcher::compile(TagSpec::new("name", TagOperator::Eq, "cpu.*.test2")).unwrap();
        assert!(glob.matches("cpu.test1.test2", &labels(&[])));
        assert!(!glob.matches("cpu.test1.test3", &labels(&[])));
    }

    #[test]
    fn predicate_is_and_of_specs() {
        let p = TagPredicate::parse("seriesByTag('name=cpu1', 'dc=ru1')").unwrap();
        assert_eq!(p.name_equality(), Some("cpu1"));
        assert!(p.matches("cpu1", &labels(&[("dc", "ru1")])));
        assert!(!p.matches("cpu1", &labels(&[("dc", "ru2")])));
        assert!(!p.matches("cpu2", &labels(&[("dc", "ru1")])));

        let p = TagPredicate::parse("seriesByTag('dc=ru1')").unwrap();
        assert_eq!(p.name_equality(), None);
        assert_eq!(p.raw(), "seriesByTag('dc=ru1')");
        assert_eq!(p.matchers().len(), 1);
    }

    #[test]
    fn unclosed_brace_stays_inside_its_spec() {
        let p = TagPredicate::parse("seriesByTag('a={b', 'c=d')").unwrap();
        assert_eq!(p.matchers().len(), 2);
        assert!(p.matches("m", &labels(&[("a", "{b"), ("c", "d")])));
        assert!(!p.matches("m", &labels(&[("a", "{b"), ("c", "e")])));
    }
}
