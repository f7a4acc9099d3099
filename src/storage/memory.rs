//! In-memory pattern store.
//!
//! Thread-safe `PatternSource` implementation intended for embedded usage,
//! tests, and as a reference implementation for real backends.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::storage::traits::{PatternSource, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory pattern store.
///
/// Patterns are kept in a sorted set, so `get_patterns` returns them in a
/// stable order without duplicates.
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    patterns: RwLock<BTreeSet<String>>,
    unavailable: AtomicBool,
}

impl InMemoryPatternStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with patterns.
    #[must_use]
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: RwLock::new(patterns.into_iter().map(Into::into).collect()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Register a pattern. Returns false if it was already present.
    pub fn insert(&self, pattern: impl Into<String>) -> Result<bool, StorageError> {
        let mut state = self.patterns.write().map_err(|_| lock_err("patterns.insert"))?;
        Ok(state.insert(pattern.into()))
    }

    /// Remove a pattern. Returns false if it was not registered.
    pub fn remove(&self, pattern: &str) -> Result<bool, StorageError> {
        let mut state = self.patterns.write().map_err(|_| lock_err("patterns.remove"))?;
        Ok(state.remove(pattern))
    }

    /// Replace the whole pattern set.
    pub fn replace<I, S>(&self, patterns: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: BTreeSet<String> = patterns.into_iter().map(Into::into).collect();
        let mut state = self.patterns.write().map_err(|_| lock_err("patterns.replace"))?;
        *state = next;
        Ok(())
    }

    /// Number of registered patterns.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.patterns.read().map_err(|_| lock_err("patterns.len"))?;
        Ok(state.len())
    }

    /// Returns true if no pattern is registered.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Simulate a backend outage: while set, `get_patterns` fails with
    /// `StorageError::ConnectionError`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }
}

impl PatternSource for InMemoryPatternStore {
    fn get_patterns(&self) -> Result<Vec<String>, StorageError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StorageError::ConnectionError(
                "in-memory pattern store marked unavailable".to_string(),
            ));
        }
        let state = self.patterns.read().map_err(|_| lock_err("patterns.get"))?;
        Ok(state.iter().cloned().collect())
    }
}
