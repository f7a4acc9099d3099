//! Abstract pattern source for kyro-filter.
//!
//! The matching engine consumes exactly one storage operation: the full list
//! of currently registered pattern strings. Backends (Redis, SQL, in-memory)
//! implement `PatternSource` so the engine never depends on a concrete store.

use thiserror::Error;

/// Errors that can occur while reading patterns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Storage trait for reading registered subscription patterns.
///
/// Implementations must be safe to call from the refresh thread while other
/// threads mutate the underlying store. The returned list is a complete
/// snapshot; no paging or streaming contract exists.
pub trait PatternSource: Send + Sync {
    /// Return every currently registered pattern string.
    fn get_patterns(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: PatternSource + ?Sized> PatternSource for std::sync::Arc<T> {
    fn get_patterns(&self) -> Result<Vec<String>, StorageError> {
        (**self).get_patterns()
    }
}
