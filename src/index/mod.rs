//! Match indexes.
//!
//! Each index is an immutable generation built from a full pattern snapshot.
//! [`crate::filter::PatternStorage`] publishes a new generation per refresh;
//! readers keep whichever generation they loaded.

pub mod glob;
pub mod tag;
pub mod trie;

pub use glob::GlobIndex;
pub use tag::TagIndex;
pub use trie::PatternTrie;
