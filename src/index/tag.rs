//! Tag-predicate index: matches tagged metrics against `seriesByTag` patterns.
//!
//! A pattern holds iff all of its tag specs hold. Patterns carrying a
//! `name=<value>` spec are filed in a name trie under that value, so only
//! patterns whose name constraint admits the metric path are evaluated.
//! Patterns without one are evaluated for every metric. Both paths end in
//! the same full AND evaluation, so pruning never changes the result:
//! [`TagIndex::match_patterns_scan`] is the unpruned reference.

use std::collections::HashMap;

use crate::pattern::{GlobPattern, TagPredicate};

use super::trie::PatternTrie;

/// One immutable generation of the tag-predicate index.
#[derive(Debug, Default)]
pub struct TagIndex {
    predicates: Vec<TagPredicate>,
    by_name: PatternTrie<usize>,
    unindexed: Vec<usize>,
}

impl TagIndex {
    /// Builds a generation from compiled predicates.
    #[must_use]
    pub fn build<I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = TagPredicate>,
    {
        let predicates: Vec<TagPredicate> = patterns.into_iter().collect();
        let mut by_name = PatternTrie::new();
        let mut unindexed = Vec::new();

        for (idx, predicate) in predicates.iter().enumerate() {
            match predicate.name_equality().map(GlobPattern::parse) {
                Some(Ok(glob)) => by_name.insert(&glob, idx),
                _ => unindexed.push(idx),
            }
        }

        Self {
            predicates,
            by_name,
            unindexed,
        }
    }

    /// Number of indexed patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if no pattern is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Number of patterns reachable through the name trie.
    #[must_use]
    pub const fn name_indexed(&self) -> usize {
        self.by_name.len()
    }

    /// Returns every pattern whose tag specs all hold for the metric.
    #[must_use]
    pub fn match_patterns(&self, name: &str, labels: &HashMap<String, String>) -> Vec<String> {
        let mut matched = Vec::new();
        let mut check = |idx: usize| {
            let predicate = &self.predicates[idx];
            if predicate.matches(name, labels) {
                matched.push(predicate.raw().to_string());
            }
        };

        self.by_name.for_each_match(name, |&idx| check(idx));
        self.unindexed.iter().for_each(|&idx| check(idx));
        matched
    }

    /// Full AND scan over every compiled predicate, without pruning.
    #[must_use]
    pub fn match_patterns_scan(&self, name: &str, labels: &HashMap<String, String>) -> Vec<String> {
        self.predicates
            .iter()
            .filter(|p| p.matches(name, labels))
            .map(|p| p.raw().to_string())
            .collect()
    }
}
