//! The two-pass ranking driver.
//!
//! Pass 1 walks the resolved candidates, merges each document's sublists,
//! scores it and offers it to the top-K. Pass 2, only run when scoring
//! details are requested, re-scores the retained documents with explain
//! capture.

use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::error::Result;
use crate::lookup::{DocumentIndex, PageTemperature, SiteFlags, SiteWhitelist};
use crate::posting::WorkingList;
use crate::query::Query;
use crate::ranking::candidates::CandidateSet;
use crate::ranking::compactor::compact_term_lists;
use crate::ranking::cursor::SubListCursor;
use crate::ranking::explain::{DocIdScore, ExplainBuffer, PairScore, SingleScore};
use crate::ranking::merge::{MergedDoc, SourceBlock};
use crate::ranking::pruning::{ScoreBound, Verdict};
use crate::ranking::request::RankingRequest;
use crate::ranking::scoring::{MIN_SEED, ScoreMatrix, Scorer, adjusted_site_rank};
use crate::ranking::term_info::{SortBy, SublistFlags, TermGrouping};
use crate::ranking::window::SlidingWindow;
use crate::top_tree::{TopNode, TopTree};
use crate::weights::{ScoringWeights, WeightRegistry};

/// Lookups the driver consults per document.
#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    pub index: &'a dyn DocumentIndex,
    pub whitelist: Option<&'a dyn SiteWhitelist>,
    pub temperature: Option<&'a dyn PageTemperature>,
    pub site_flags: Option<&'a dyn SiteFlags>,
}

impl<'a> RankingContext<'a> {
    pub fn new(index: &'a dyn DocumentIndex) -> Self {
        Self {
            index,
            whitelist: None,
            temperature: None,
            site_flags: None,
        }
    }

    pub fn with_whitelist(mut self, whitelist: &'a dyn SiteWhitelist) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    pub fn with_temperature(mut self, temperature: &'a dyn PageTemperature) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_site_flags(mut self, site_flags: &'a dyn SiteFlags) -> Self {
        self.site_flags = Some(site_flags);
        self
    }
}

/// Counters of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RankingStats {
    pub candidates: usize,
    /// Documents that went through full scoring.
    pub scored: usize,
    pub pruned_max_score: usize,
    pub pruned_distance: usize,
    /// Missing sort-by value or outside the serp paging cursor.
    pub filtered: usize,
    pub not_in_index: usize,
    pub skipped_zero_score: usize,
    /// Explanations stored by pass 2.
    pub explained: usize,
}

/// Runs ranking evaluations with one snapshot of the scoring weights.
#[derive(Debug, Clone)]
pub struct RankingEngine {
    weights: Arc<ScoringWeights>,
}

impl RankingEngine {
    pub fn new(weights: Arc<ScoringWeights>) -> Self {
        Self { weights }
    }

    pub fn from_registry(registry: &WeightRegistry) -> Self {
        Self::new(registry.current())
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Rank the documents matching `query` into `tree`.
    ///
    /// With `request.get_doc_id_scoring_info` set, the score breakdown of
    /// every retained document is stored in `explain`.
    pub fn rank(
        &self,
        query: &Query,
        request: &RankingRequest,
        ctx: &RankingContext<'_>,
        tree: &mut dyn TopTree,
        explain: Option<&mut ExplainBuffer>,
    ) -> Result<RankingStats> {
        request.validate()?;
        query.validate()?;
        let mut stats = RankingStats::default();
        let start = Instant::now();

        let mut lists = Vec::new();
        lists.try_reserve_exact(query.terms.len())?;
        for term in &query.terms {
            lists.push(match &term.list {
                Some(list) => WorkingList::from_term_list(list)?,
                None => WorkingList::default(),
            });
        }

        let grouping = TermGrouping::build(query, &lists, self.weights.max_sublists)?;
        if grouping.is_empty() {
            debug!("query has no required terms");
            return Ok(stats);
        }
        let candidates = CandidateSet::resolve(query, &grouping, &lists, ctx.whitelist)?;
        stats.candidates = candidates.len();
        debug!(
            "{} candidates from {} term-infos in {:?}",
            candidates.len(),
            grouping.len(),
            start.elapsed()
        );
        if candidates.is_empty() {
            return Ok(stats);
        }

        let ids = candidates.ascending_ids()?;
        let matching = compact_term_lists(&grouping, &ids, &mut lists)?;
        let sublists: Vec<Vec<(usize, SublistFlags)>> = matching
            .iter()
            .map(|subs| subs.iter().map(|s| (s.qterm, s.flags)).collect())
            .collect();

        if let Some(sort) = grouping.sort_by {
            tree.set_use_int_scores(sort.int);
        }

        let mut eval = Evaluation::new(
            &self.weights,
            &grouping,
            &candidates,
            &lists,
            &sublists,
            request,
            ctx,
        );

        let pass1 = Instant::now();
        for doc_id in candidates.doc_ids() {
            let lowest = if eval.can_prune() {
                tree.lowest_score()
            } else {
                None
            };
            match eval.evaluate(doc_id, lowest, None)? {
                Outcome::NotInIndex => stats.not_in_index += 1,
                Outcome::Pruned(Verdict::PrunedMaxScore) => stats.pruned_max_score += 1,
                Outcome::Pruned(_) => stats.pruned_distance += 1,
                Outcome::ZeroScore => {
                    stats.scored += 1;
                    stats.skipped_zero_score += 1;
                }
                Outcome::Filtered => {
                    stats.scored += 1;
                    stats.filtered += 1;
                }
                Outcome::Scored { node, .. } => {
                    stats.scored += 1;
                    tree.add_node(node);
                }
            }
        }
        debug!(
            "pass 1: scored {}, pruned {} by max score and {} by distance, in {:?}",
            stats.scored,
            stats.pruned_max_score,
            stats.pruned_distance,
            pass1.elapsed()
        );

        if request.get_doc_id_scoring_info {
            match explain {
                Some(buffer) => {
                    stats.explained = eval.explain_top(&*tree, buffer)?;
                }
                None => warn!("scoring info requested without an explain buffer"),
            }
        }

        info!(
            "ranked {} candidates into {} results in {:?}",
            stats.candidates,
            tree.num_used_nodes(),
            start.elapsed()
        );
        Ok(stats)
    }
}

/// Result of evaluating one candidate.
#[derive(Debug)]
enum Outcome {
    NotInIndex,
    Pruned(Verdict),
    ZeroScore,
    Filtered,
    Scored { node: TopNode, doc: DocIdScore },
}

/// Explain slots captured while re-scoring one document.
#[derive(Debug, Default)]
struct Capture {
    singles: Vec<SingleScore>,
    pairs: Vec<PairScore>,
}

/// Per-evaluation state: sublist cursors and reusable buffers.
struct Evaluation<'a> {
    scorer: Scorer<'a>,
    request: &'a RankingRequest,
    ctx: &'a RankingContext<'a>,
    grouping: &'a TermGrouping,
    candidates: &'a CandidateSet,
    boolean: bool,
    cursors: Vec<Vec<(SublistFlags, SubListCursor<'a>)>>,
    sources: Vec<Vec<SourceBlock<'a>>>,
    merged: MergedDoc,
    best_non_body: Vec<Option<usize>>,
    matrix: ScoreMatrix,
    window: SlidingWindow,
    bound: ScoreBound<'a>,
}

impl<'a> Evaluation<'a> {
    fn new(
        weights: &'a ScoringWeights,
        grouping: &'a TermGrouping,
        candidates: &'a CandidateSet,
        lists: &'a [WorkingList],
        sublists: &[Vec<(usize, SublistFlags)>],
        request: &'a RankingRequest,
        ctx: &'a RankingContext<'a>,
    ) -> Self {
        let n = grouping.len();
        let scorer = Scorer::new(weights, &grouping.infos, request);
        let cursors = sublists
            .iter()
            .map(|subs| {
                subs.iter()
                    .map(|&(qterm, flags)| (flags, SubListCursor::new(&lists[qterm])))
                    .collect()
            })
            .collect();
        Self {
            scorer,
            request,
            ctx,
            grouping,
            candidates,
            boolean: candidates.is_boolean(),
            cursors,
            sources: vec![Vec::new(); n],
            merged: MergedDoc::new(),
            best_non_body: vec![None; n],
            matrix: ScoreMatrix::new(n),
            window: SlidingWindow::new(n),
            bound: ScoreBound::new(scorer, request, grouping.all_in_same_wiki_phrase),
        }
    }

    fn can_prune(&self) -> bool {
        !self.boolean && self.grouping.sort_by.is_none() && self.request.do_max_score_algo
    }

    /// Point every sublist cursor at `doc_id` and collect its blocks.
    fn seek(&mut self, doc_id: u64) {
        for (sources, cursors) in self.sources.iter_mut().zip(self.cursors.iter_mut()) {
            sources.clear();
            for (flags, cursor) in cursors.iter_mut() {
                if let Some(block) = cursor.seek(doc_id) {
                    sources.push(SourceBlock {
                        flags: *flags,
                        block,
                    });
                }
            }
        }
    }

    fn evaluate(
        &mut self,
        doc_id: u64,
        lowest: Option<f32>,
        mut capture: Option<&mut Capture>,
    ) -> Result<Outcome> {
        if !self.ctx.index.exists(doc_id) {
            trace!("doc {doc_id} is not in the index");
            return Ok(Outcome::NotInIndex);
        }
        let flags = self.ctx.site_flags.map_or(0, |f| f.flags(doc_id));
        let flags_multiplier = self.request.flags_multiplier(flags);
        let temperature = match (self.request.use_page_temperature, self.ctx.temperature) {
            (true, Some(t)) => t.temperature(
                doc_id,
                self.request.page_temperature_weight_min,
                self.request.page_temperature_weight_max,
            ),
            _ => 1.0,
        };
        self.seek(doc_id);

        if let Some(lowest) = lowest {
            let factor = self
                .bound
                .doc_factor(&self.sources, flags_multiplier, temperature);
            let verdict = self
                .bound
                .check(self.grouping.pivot, &self.sources, factor, lowest);
            if verdict != Verdict::Score {
                return Ok(Outcome::Pruned(verdict));
            }
        }

        let n = self.grouping.len();
        self.merged.reset(doc_id, n);
        for i in self.grouping.positive() {
            self.merged.merge_info(i, &self.sources[i])?;
        }

        let mut doc = DocIdScore::new(doc_id);
        doc.flags = flags;
        let min_score = if self.boolean {
            self.candidates.bits_on(doc_id).unwrap_or(1) as f32
        } else {
            self.matrix.reset();
            self.scorer.non_body_matrix(&self.merged, &mut self.matrix);
            let single = self.scorer.min_single_term_score_sum(
                &self.merged,
                &mut self.best_non_body,
                capture.as_mut().map(|c| &mut c.singles),
            ) * flags_multiplier;

            if let Some(header) = (0..n)
                .filter(|&i| !self.grouping.infos[i].is_number())
                .find_map(|i| self.merged.header(i))
            {
                doc.site_rank = header.site_rank;
                doc.lang = header.lang_id;
            }

            let pair = self.window.score(
                &self.scorer,
                &self.merged,
                &self.best_non_body,
                &self.matrix,
                capture.as_mut().map(|c| &mut c.pairs),
            ) * flags_multiplier;
            doc.min_single_score = single;
            doc.min_pair_score = pair;

            let mut min = MIN_SEED;
            if pair < min && pair >= 0.0 {
                min = pair;
            }
            if single < min {
                min = single;
            }
            min
        };
        if min_score <= 0.0 {
            trace!("doc {doc_id}: no positive score");
            return Ok(Outcome::ZeroScore);
        }

        doc.highest_inlink_site_rank = self.merged.highest_inlink_site_rank();
        let adjusted = adjusted_site_rank(doc.site_rank, doc.highest_inlink_site_rank);
        let site_rank_multiplier = if self.boolean {
            0.0
        } else {
            self.scorer.weights().site_rank_multiplier
        };
        let mut score = min_score * (adjusted * site_rank_multiplier + 1.0);
        score *= self.request.language_weight(doc.lang);
        score *= temperature;

        let mut int_score = None;
        if let Some(sort) = self.grouping.sort_by {
            match self.sort_value(sort) {
                Some(SortValue::Int(v)) => int_score = Some(v),
                Some(SortValue::Float(v)) => score = v,
                None => return Ok(Outcome::Filtered),
            }
        }
        if !self.passes_serp_cursor(doc_id, score, int_score) {
            return Ok(Outcome::Filtered);
        }

        doc.final_score = score;
        doc.int_score = int_score;
        if self.request.debug {
            debug!(
                "doc {doc_id}: single {} pair {} site rank {} (inlink {:?}) lang {} final {score}",
                doc.min_single_score,
                doc.min_pair_score,
                doc.site_rank,
                doc.highest_inlink_site_rank,
                doc.lang
            );
        }

        let mut node = match int_score {
            Some(v) => TopNode::with_int_score(doc_id, v),
            None => TopNode::new(doc_id, score),
        };
        node.flags = flags;
        Ok(Outcome::Scored { node, doc })
    }

    /// Raw value of the sort-by field, negated for reverse sorts.
    fn sort_value(&self, sort: SortBy) -> Option<SortValue> {
        let key = self.merged.stream(sort.info)?.iter().next()?;
        Some(if sort.int {
            let v = key.int_value();
            SortValue::Int(if sort.reverse {
                v.checked_neg().unwrap_or(i32::MAX)
            } else {
                v
            })
        } else {
            let v = key.float_value();
            SortValue::Float(if sort.reverse { -v } else { v })
        })
    }

    /// Whether the document ranks after the serp paging cursor.
    fn passes_serp_cursor(&self, doc_id: u64, score: f32, int_score: Option<i32>) -> bool {
        let Some(min_doc_id) = self.request.min_serp_doc_id else {
            return true;
        };
        let max = self.request.max_serp_score.unwrap_or(f64::MAX);
        match int_score {
            Some(v) => {
                let max = max.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
                !(v > max || (v == max && doc_id <= min_doc_id))
            }
            None => {
                let max32 = max as f32;
                !(f64::from(score) > max || (almost_equal(score, max32) && doc_id <= min_doc_id))
            }
        }
    }

    /// Pass 2: re-score the retained documents with explain capture.
    fn explain_top(&mut self, tree: &dyn TopTree, buffer: &mut ExplainBuffer) -> Result<usize> {
        let start = Instant::now();
        buffer.ensure_capacity(tree.docs_wanted());
        let removed = buffer.retain_docs(|id| tree.contains_doc_id(id));
        if removed > 0 {
            debug!("removed {removed} explanations of documents no longer retained");
        }

        let range: Option<Range<u64>> = self.request.doc_id_range.clone();
        let mut capture = Capture::default();
        let mut explained = 0;
        for node in tree
            .nodes()
            .into_iter()
            .filter(|node| range.as_ref().is_none_or(|r| r.contains(&node.doc_id)))
            .take(self.request.docs_to_get)
        {
            capture.singles.clear();
            capture.pairs.clear();
            match self.evaluate(node.doc_id, None, Some(&mut capture))? {
                Outcome::Scored { doc, .. } => {
                    if buffer.add(doc, &capture.singles, &capture.pairs, |id| {
                        tree.contains_doc_id(id)
                    }) {
                        explained += 1;
                    }
                }
                other => warn!(
                    "doc {} no longer scores on re-evaluation: {other:?}",
                    node.doc_id
                ),
            }
        }
        debug!("pass 2: explained {explained} documents in {:?}", start.elapsed());
        Ok(explained)
    }
}

#[derive(Debug, Clone, Copy)]
enum SortValue {
    Int(i32),
    Float(f32),
}

fn almost_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{AllDocuments, DocIdSet, SiteFlagTable};
    use crate::posting::{HashGroup, NumericValue, PostingFields, TermListBuilder};
    use crate::query::{BoolExpr, FieldCode, QueryTerm, TermSign};
    use crate::top_tree::BoundedTopTree;

    fn term(text: &str, id: u64, qpos: i32, docs: &[(u64, &[PostingFields])]) -> QueryTerm {
        let mut builder = TermListBuilder::new(id);
        for (doc, postings) in docs {
            builder.add_doc(*doc, 0, 1, postings).unwrap();
        }
        QueryTerm::new(text, id)
            .with_list(builder.build())
            .with_qpos(qpos)
    }

    fn engine() -> RankingEngine {
        RankingEngine::new(Arc::new(ScoringWeights::default()))
    }

    fn ranked(tree: &BoundedTopTree) -> Vec<u64> {
        tree.nodes().iter().map(|n| n.doc_id).collect()
    }

    #[test]
    fn test_close_pair_ranks_first() {
        let query = Query::new(vec![
            term(
                "new",
                1,
                0,
                &[(1, &[PostingFields::body(10)]), (2, &[PostingFields::body(10)])],
            ),
            term(
                "york",
                2,
                2,
                &[(1, &[PostingFields::body(12)]), (2, &[PostingFields::body(300)])],
            ),
        ]);
        let request = RankingRequest::new(10);
        let ctx = RankingContext::new(&AllDocuments);
        let mut tree = BoundedTopTree::new(10);
        let stats = engine()
            .rank(&query, &request, &ctx, &mut tree, None)
            .unwrap();
        assert_eq!(stats.candidates, 2);
        assert_eq!(stats.scored, 2);
        assert_eq!(ranked(&tree), vec![1, 2]);
    }

    #[test]
    fn test_missing_docs_are_counted() {
        let query = Query::new(vec![term(
            "a",
            1,
            0,
            &[(1, &[PostingFields::body(1)]), (2, &[PostingFields::body(1)])],
        )]);
        let index = DocIdSet::new([2]);
        let ctx = RankingContext::new(&index);
        let mut tree = BoundedTopTree::new(10);
        let stats = engine()
            .rank(&query, &RankingRequest::new(10), &ctx, &mut tree, None)
            .unwrap();
        assert_eq!(stats.not_in_index, 1);
        assert_eq!(ranked(&tree), vec![2]);
    }

    #[test]
    fn test_site_flags_scale_score() {
        let query = Query::new(vec![term(
            "a",
            1,
            0,
            &[(1, &[PostingFields::body(1)]), (2, &[PostingFields::body(1)])],
        )]);
        let mut flags = SiteFlagTable::new();
        flags.insert(2, 0b1);
        let mut request = RankingRequest::new(10);
        request.flag_score_multipliers[0] = 3.0;
        let ctx = RankingContext::new(&AllDocuments).with_site_flags(&flags);
        let mut tree = BoundedTopTree::new(10);
        engine()
            .rank(&query, &request, &ctx, &mut tree, None)
            .unwrap();
        let nodes = tree.nodes();
        assert_eq!(nodes[0].doc_id, 2);
        assert_eq!(nodes[0].flags, 0b1);
        assert!((nodes[0].score - 3.0 * nodes[1].score).abs() < 1e-3);
    }

    #[test]
    fn test_boolean_scores_by_matched_terms() {
        let query = Query::boolean(
            vec![
                term("a", 1, 0, &[(1, &[PostingFields::body(1)]), (2, &[PostingFields::body(1)])]),
                term("b", 2, 2, &[(2, &[PostingFields::body(5)])]),
            ],
            BoolExpr::or(vec![BoolExpr::term(0), BoolExpr::term(1)]),
        );
        let ctx = RankingContext::new(&AllDocuments);
        let mut tree = BoundedTopTree::new(10);
        engine()
            .rank(&query, &RankingRequest::new(10), &ctx, &mut tree, None)
            .unwrap();
        let nodes = tree.nodes();
        assert_eq!(nodes[0].doc_id, 2);
        assert_eq!(nodes[0].score, 2.0);
        assert_eq!(nodes[1].score, 1.0);
    }

    #[test]
    fn test_serp_cursor_skips_earlier_results() {
        let query = Query::new(vec![term(
            "a",
            1,
            0,
            &[
                (1, &[PostingFields::with_group(1, HashGroup::Title)]),
                (2, &[PostingFields::body(1)]),
                (3, &[PostingFields::body(1)]),
            ],
        )]);
        let ctx = RankingContext::new(&AllDocuments);
        let mut tree = BoundedTopTree::new(10);
        engine()
            .rank(&query, &RankingRequest::new(10), &ctx, &mut tree, None)
            .unwrap();
        let all = tree.nodes();
        assert_eq!(all[0].doc_id, 1);

        // Resume after the second result (doc 2).
        let mut request = RankingRequest::new(10);
        request.max_serp_score = Some(f64::from(all[1].score));
        request.min_serp_doc_id = Some(all[1].doc_id);
        let mut tree = BoundedTopTree::new(10);
        let stats = engine()
            .rank(&query, &request, &ctx, &mut tree, None)
            .unwrap();
        assert_eq!(ranked(&tree), vec![3]);
        assert_eq!(stats.filtered, 2);
    }

    #[test]
    fn test_negative_term_excludes() {
        let query = Query::new(vec![
            term("a", 1, 0, &[(1, &[PostingFields::body(1)]), (2, &[PostingFields::body(1)])]),
            term("b", 2, 2, &[(1, &[PostingFields::body(3)])]).with_sign(TermSign::Minus),
        ]);
        let ctx = RankingContext::new(&AllDocuments);
        let mut tree = BoundedTopTree::new(10);
        engine()
            .rank(&query, &RankingRequest::new(10), &ctx, &mut tree, None)
            .unwrap();
        assert_eq!(ranked(&tree), vec![2]);
    }

    #[test]
    fn test_int_sort_by() {
        let mut builder = TermListBuilder::new(9);
        for (doc, value) in [(1, 30), (2, 10), (3, 20)] {
            builder
                .add_numeric_doc(doc, 0, 1, &[NumericValue::Int(value)])
                .unwrap();
        }
        let query = Query::new(vec![
            QueryTerm::new("gbsortbyint:price", 9)
                .with_list(builder.build())
                .with_field(FieldCode::SortByInt),
        ]);
        let ctx = RankingContext::new(&AllDocuments);
        let mut tree = BoundedTopTree::new(10);
        engine()
            .rank(&query, &RankingRequest::new(10), &ctx, &mut tree, None)
            .unwrap();
        assert!(tree.use_int_scores());
        assert_eq!(ranked(&tree), vec![1, 3, 2]);
    }

    #[test]
    fn test_almost_equal() {
        assert!(almost_equal(1.0, 1.0 + 1e-7));
        assert!(!almost_equal(1.0, 1.001));
    }
}
