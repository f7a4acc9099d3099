//! Glob index: matches untagged metric names against dotted glob patterns.

use std::sync::Arc;

use crate::pattern::GlobPattern;

use super::trie::PatternTrie;

/// One immutable generation of the glob index.
#[derive(Debug, Default)]
pub struct GlobIndex {
    trie: PatternTrie<Arc<str>>,
}

impl GlobIndex {
    /// Builds a generation from compiled patterns.
    ///
    /// Callers de-duplicate pattern strings; a repeated pattern would be
    /// reported twice per match.
    #[must_use]
    pub fn build<I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = GlobPattern>,
    {
        let mut trie = PatternTrie::new();
        for glob in patterns {
            let raw: Arc<str> = Arc::from(glob.raw());
            trie.insert(&glob, raw);
        }
        Self { trie }
    }

    /// Number of indexed patterns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.trie.len()
    }

    /// Returns true if no pattern is indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// Returns every pattern matching `name`.
    #[must_use]
    pub fn match_patterns(&self, name: &str) -> Vec<String> {
        let mut matched = Vec::new();
        self.trie.for_each_match(name, |raw| matched.push(raw.to_string()));
        matched
    }
}
