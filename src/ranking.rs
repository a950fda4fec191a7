//! Query-time intersection and ranking.
//!
//! [`RankingEngine::rank`] is the entry point. The submodules are the
//! stages it runs, in order: term grouping, candidate resolution,
//! compaction, per-document merge, pruning, scoring and the explain pass.

pub mod candidates;
pub mod compactor;
pub mod cursor;
pub mod engine;
pub mod explain;
pub mod merge;
pub mod pruning;
pub mod request;
pub mod scoring;
pub mod term_info;
pub mod window;

pub use candidates::{Candidate, CandidateSet};
pub use compactor::{MatchingSubList, compact_list, compact_term_lists};
pub use cursor::SubListCursor;
pub use engine::{RankingContext, RankingEngine, RankingStats};
pub use explain::{DocExplanation, DocIdScore, ExplainBuffer, PairScore, SingleScore};
pub use merge::{MergedDoc, MergedStream, SourceBlock};
pub use pruning::{ScoreBound, Verdict};
pub use request::{LANG_UNKNOWN, NUM_SITE_FLAGS, RankingRequest};
pub use scoring::{NO_SCORE, PairGeometry, ScoreMatrix, Scorer, SingleTermScore};
pub use term_info::{SortBy, SubList, SublistFlags, TermGrouping, TermInfo};
pub use window::SlidingWindow;
