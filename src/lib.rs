//! # posrank
//!
//! Query-time posting-list intersection and proximity ranking.
//!
//! Given the packed positional termlists of a parsed query, posrank finds
//! the documents that satisfy the query, scores each one by how close and
//! where the query terms occur, and keeps the best results in a top-K.
//!
//! ## Features
//!
//! - Packed 18/12/6-byte positional posting records
//! - Synonym, bigram and wiki-phrase aware term grouping
//! - Vote-based and boolean candidate resolution
//! - Sliding-window proximity scoring with hash-group weights
//! - Sound max-score and distance pruning
//! - Sort-by numeric fields and serp paging
//! - Per-document score explanations

pub mod cli;
pub mod config;
pub mod error;
pub mod lookup;
pub mod posting;
pub mod query;
pub mod ranking;
pub mod top_tree;
pub mod weights;

pub mod prelude {
    pub use crate::config::RankingConfig;
    pub use crate::error::{RankError, Result};
    pub use crate::lookup::{AllDocuments, DocIdSet, DocumentIndex};
    pub use crate::posting::{HashGroup, PostingFields, TermList, TermListBuilder};
    pub use crate::query::{BoolExpr, FieldCode, Query, QueryTerm, TermSign};
    pub use crate::ranking::{
        ExplainBuffer, RankingContext, RankingEngine, RankingRequest, RankingStats,
    };
    pub use crate::top_tree::{BoundedTopTree, TopNode, TopTree};
    pub use crate::weights::{ScoringWeights, WeightRegistry};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
