//! Packed positional postings.
//!
//! A termlist is a byte sequence of variable-width records. See [`key`] for
//! the record layout and [`list`] for the per-evaluation working copy.

pub mod builder;
pub mod hash_group;
pub mod key;
pub mod list;

pub use builder::TermListBuilder;
pub use hash_group::{HashGroup, NUM_HASH_GROUPS};
pub use key::{DocHeader, NumericValue, PostingFields, PostingKey, RecordWidth};
pub use list::{DocBlock, DocBlocks, Keys, TermList, WorkingList};
