//! Segment trie over dotted glob patterns.
//!
//! Nodes live in an arena. Each node keeps literal children in a hash map
//! (one lookup per input segment) and wildcard children (`*`, alternations,
//! partial segments) in a short list that is scanned. Identical segment text
//! under the same parent shares a node, so patterns with a common prefix
//! share a path.
//!
//! Matching walks a frontier of live nodes one input segment at a time. A
//! node has a single parent, so the frontier never holds duplicates and the
//! cost is bounded by name length times branching factor, independent of the
//! number of registered patterns.

use std::collections::HashMap;

use crate::pattern::{GlobPattern, Segment};

const ROOT: usize = 0;

#[derive(Debug)]
struct Node<T> {
    literals: HashMap<String, usize>,
    wildcards: Vec<(Segment, usize)>,
    terminals: Vec<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            wildcards: Vec::new(),
            terminals: Vec::new(),
        }
    }
}

/// Trie keyed by glob segments, carrying a payload per terminated pattern.
#[derive(Debug)]
pub struct PatternTrie<T> {
    nodes: Vec<Node<T>>,
    len: usize,
}

impl<T> Default for PatternTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PatternTrie<T> {
    /// Creates an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            len: 0,
        }
    }

    /// Number of inserted payloads.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing was inserted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of trie nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Adds a pattern path ending in `payload`.
    pub fn insert(&mut self, glob: &GlobPattern, payload: T) {
        let mut current = ROOT;
        for segment in glob.segments() {
            current = self.child_for(current, segment);
        }
        self.nodes[current].terminals.push(payload);
        self.len += 1;
    }

    fn child_for(&mut self, parent: usize, segment: &Segment) -> usize {
        let existing = if segment.is_literal() {
            self.nodes[parent].literals.get(segment.source()).copied()
        } else {
            self.nodes[parent]
                .wildcards
                .iter()
                .find(|(s, _)| s.source() == segment.source())
                .map(|(_, idx)| *idx)
        };
        if let Some(idx) = existing {
            return idx;
        }

        let idx = self.nodes.len();
        self.nodes.push(Node::default());
        let node = &mut self.nodes[parent];
        if segment.is_literal() {
            node.literals.insert(segment.source().to_string(), idx);
        } else {
            node.wildcards.push((segment.clone(), idx));
        }
        idx
    }

    /// Calls `visit` for every payload whose pattern matches `name`.
    pub fn for_each_match<F>(&self, name: &str, mut visit: F)
    where
        F: FnMut(&T),
    {
        if self.is_empty() {
            return;
        }

        let mut frontier = vec![ROOT];
        let mut next = Vec::new();
        for part in name.split('.') {
            next.clear();
            for &idx in &frontier {
                let node = &self.nodes[idx];
                if let Some(&child) = node.literals.get(part) {
                    next.push(child);
                }
                next.extend(
                    node.wildcards
                        .iter()
                        .filter(|(segment, _)| segment.matches(part))
                        .map(|(_, child)| *child),
                );
            }
            if next.is_empty() {
                return;
            }
            std::mem::swap(&mut frontier, &mut next);
        }

        for &idx in &frontier {
            self.nodes[idx].terminals.iter().for_each(&mut visit);
        }
    }
}
