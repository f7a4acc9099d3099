//! Pattern storage collaborator.
//!
//! The trait defines the single read the engine needs; the in-memory backend
//! serves embedded use and tests.

mod memory;
mod traits;

pub use memory::InMemoryPatternStore;
pub use traits::{PatternSource, StorageError};
