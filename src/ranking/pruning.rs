//! Score bounds used to skip documents that cannot enter a full top-K.
//!
//! Bounds are computed from the raw sublist blocks of a document, before
//! the per-term merge, so a pruned document costs one pass over its
//! postings. Every bound is an upper bound of the score full evaluation
//! would produce; a document is only skipped when even the bound fails to
//! beat the lowest retained score.

use bit_vec::BitVec;
use log::trace;

use crate::posting::{NUM_HASH_GROUPS, PostingKey};
use crate::ranking::merge::SourceBlock;
use crate::ranking::request::RankingRequest;
use crate::ranking::scoring::{DEFAULT_QDIST, NO_SCORE, Scorer, adjusted_site_rank};
use crate::ranking::term_info::SublistFlags;

/// Word positions are folded onto a ring of this many slots.
const RING_SIZE: usize = 4096;

/// Headroom for the different float summation order of the bounds.
const BOUND_SLACK: f32 = 1.0001;

/// Outcome of the bound check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The document may beat the top-K and has to be scored.
    Score,
    /// The single-term bound cannot beat the top-K.
    PrunedMaxScore,
    /// No pairing of the pivot with some other term is close enough.
    PrunedDistance,
}

/// Per term-info maxima over the surviving postings of one document.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TermBound {
    single: f32,
    side_max: f32,
    count: usize,
}

/// Postings that survive the merge: split-bigram matches are dropped.
fn survivors<'s, 'a>(
    sources: &'s [SourceBlock<'a>],
) -> impl Iterator<Item = (SublistFlags, PostingKey<'a>)> + 's
where
    'a: 's,
{
    sources
        .iter()
        .flat_map(|s| s.block.keys().map(move |key| (s.flags, key)))
        .filter(|(flags, key)| !(flags.contains(SublistFlags::BIGRAM) && key.syn_bits() != 0))
}

/// Computes document score bounds for one query.
#[derive(Debug)]
pub struct ScoreBound<'a> {
    scorer: Scorer<'a>,
    request: &'a RankingRequest,
    /// Check every term pair instead of only the pivot's pairs.
    all_pairs: bool,
    bounds: Vec<Option<TermBound>>,
    candidates: Vec<f32>,
    ring_pivot: BitVec,
    ring_other: BitVec,
    marked: Vec<usize>,
}

impl<'a> ScoreBound<'a> {
    /// `all_pairs` is set when every query term sits in one wiki phrase;
    /// each pair bound then carries the wiki weight and is checked.
    pub fn new(scorer: Scorer<'a>, request: &'a RankingRequest, all_pairs: bool) -> Self {
        Self {
            scorer,
            request,
            all_pairs,
            bounds: vec![None; scorer.infos().len()],
            candidates: Vec::new(),
            ring_pivot: BitVec::from_elem(RING_SIZE, false),
            ring_other: BitVec::from_elem(RING_SIZE, false),
            marked: Vec::new(),
        }
    }

    /// Upper bound of the single-term score of term-info `i`, `None` when
    /// no posting survives the merge.
    pub fn single_bound(&mut self, i: usize, sources: &[SourceBlock<'_>]) -> Option<f32> {
        self.term_bound(i, sources).map(|b| b.single)
    }

    fn term_bound(&mut self, i: usize, sources: &[SourceBlock<'_>]) -> Option<TermBound> {
        let wbw = self.scorer.weights().wiki_bigram_weight;
        let mut group_max = [NO_SCORE; NUM_HASH_GROUPS];
        self.candidates.clear();
        let mut side_max = 0.0f32;
        let mut count = 0;

        for (flags, key) in survivors(sources) {
            let synonym = flags.intersects(SublistFlags::BIGRAM | SublistFlags::SYNONYM);
            let mut single = self.scorer.occurrence_score_as(key, synonym);
            let mut side = self.scorer.pair_side_weight_as(key, synonym);
            if flags.contains(SublistFlags::HALF_STOP_WIKI_BIGRAM) {
                single *= wbw * wbw;
                side *= wbw;
            }
            let hg = key.hash_group();
            if hg.is_link_text() {
                self.candidates.push(single);
            } else {
                let g = hg.reduced().index();
                group_max[g] = group_max[g].max(single);
            }
            side_max = side_max.max(side);
            count += 1;
        }
        if count == 0 {
            return None;
        }

        self.candidates
            .extend(group_max.iter().copied().filter(|&s| s >= 0.0));
        self.candidates.sort_unstable_by(|a, b| b.total_cmp(a));
        let fw = self.scorer.infos()[i].freq_weight;
        let single = self
            .candidates
            .iter()
            .take(self.scorer.max_top())
            .sum::<f32>()
            * fw
            * fw;
        Some(TermBound {
            single,
            side_max,
            count,
        })
    }

    /// Lower bound of the word distance between any posting of `a` and any
    /// posting of `b`, circular on the position ring.
    fn min_ring_distance(&mut self, a: &[SourceBlock<'_>], b: &[SourceBlock<'_>]) -> usize {
        self.marked.clear();
        for (_, key) in survivors(a) {
            let slot = key.word_pos() as usize & (RING_SIZE - 1);
            self.ring_pivot.set(slot, true);
            self.marked.push(slot);
        }
        for (_, key) in survivors(b) {
            let slot = key.word_pos() as usize & (RING_SIZE - 1);
            self.ring_other.set(slot, true);
            self.marked.push(slot);
        }

        let mut best = RING_SIZE;
        let (mut first_a, mut first_b) = (None, None);
        let (mut last_a, mut last_b): (Option<usize>, Option<usize>) = (None, None);
        for slot in 0..RING_SIZE {
            let in_a = self.ring_pivot.get(slot).unwrap_or(false);
            let in_b = self.ring_other.get(slot).unwrap_or(false);
            if in_a && in_b {
                best = 0;
                break;
            }
            if in_a {
                if let Some(lb) = last_b {
                    best = best.min(slot - lb);
                }
                first_a.get_or_insert(slot);
                last_a = Some(slot);
            } else if in_b {
                if let Some(la) = last_a {
                    best = best.min(slot - la);
                }
                first_b.get_or_insert(slot);
                last_b = Some(slot);
            }
        }
        if best > 0 {
            if let (Some(fb), Some(la)) = (first_b, last_a) {
                best = best.min(fb + RING_SIZE - la);
            }
            if let (Some(fa), Some(lb)) = (first_a, last_b) {
                best = best.min(fa + RING_SIZE - lb);
            }
        }

        for &slot in &self.marked {
            self.ring_pivot.set(slot, false);
            self.ring_other.set(slot, false);
        }
        best
    }

    /// Upper bound of the pair score of term-infos `p` and `i`.
    fn pair_bound(
        &mut self,
        p: usize,
        i: usize,
        sources_p: &[SourceBlock<'_>],
        sources_i: &[SourceBlock<'_>],
        bound_p: TermBound,
        bound_i: TermBound,
    ) -> f32 {
        let (lo, hi) = (p.min(i), p.max(i));
        let infos = self.scorer.infos();
        let geometry = self.scorer.pair_geometry(lo, hi);
        let qdist = if self.scorer.in_same_quoted_phrase(lo, hi) || geometry.in_same_wiki_phrase {
            infos[hi].qpos - infos[lo].qpos
        } else {
            DEFAULT_QDIST
        };
        let ring = self.min_ring_distance(sources_p, sources_i);
        let fixed = self.scorer.weights().fixed_distance;
        let dist = i32::try_from(ring).unwrap_or(i32::MAX).max(2).min(fixed);
        let dist_lb = (dist - qdist.max(1)).max(0);

        let slots = (bound_p.count.saturating_mul(bound_i.count)).min(self.scorer.max_top());
        100.0 * bound_p.side_max * bound_i.side_max / (dist_lb as f32 + 1.0)
            * slots as f32
            * geometry.wiki_weight
            * infos[lo].freq_weight
            * infos[hi].freq_weight
    }

    /// Bound of every factor applied on top of the proximity score.
    ///
    /// `sources` holds the blocks of every term-info, indexed like the
    /// term-infos.
    pub fn doc_factor(
        &self,
        sources: &[Vec<SourceBlock<'_>>],
        flags_multiplier: f32,
        temperature: f32,
    ) -> f32 {
        let infos = self.scorer.infos();
        let mut site_rank = 0u8;
        let mut inlink: Option<u8> = None;
        let mut lang_weight: Option<f32> = None;
        for (info, blocks) in infos.iter().zip(sources) {
            if info.is_number() {
                continue;
            }
            for source in blocks {
                site_rank = site_rank.max(source.block.header.site_rank);
                let w = self.request.language_weight(source.block.header.lang_id);
                lang_weight = Some(lang_weight.map_or(w, |m| m.max(w)));
                if source.flags.contains(SublistFlags::NUMBER) {
                    continue;
                }
                for key in source.block.keys() {
                    if key.hash_group().is_link_text() {
                        let r = key.word_spam_rank();
                        inlink = Some(inlink.map_or(r, |m| m.max(r)));
                    }
                }
            }
        }
        let top_rank = site_rank.max(inlink.unwrap_or(0));
        let srm = self.scorer.weights().site_rank_multiplier;
        let site_factor = (adjusted_site_rank(top_rank, None) * srm + 1.0).max(1.0);
        let lang_factor = lang_weight.unwrap_or_else(|| self.request.language_weight(0));
        flags_multiplier * site_factor * lang_factor * temperature * BOUND_SLACK
    }

    /// Decide whether a document can still beat `lowest`.
    pub fn check(
        &mut self,
        pivot: Option<usize>,
        sources: &[Vec<SourceBlock<'_>>],
        doc_factor: f32,
        lowest: f32,
    ) -> Verdict {
        let infos = self.scorer.infos();
        let mut min_single: Option<f32> = None;
        for i in 0..infos.len() {
            self.bounds[i] = None;
            if !infos[i].is_scored() {
                continue;
            }
            let Some(blocks) = sources.get(i) else {
                continue;
            };
            let bound = self.term_bound(i, blocks);
            self.bounds[i] = bound;
            if let Some(b) = bound {
                min_single = Some(min_single.map_or(b.single, |m| m.min(b.single)));
            }
        }
        let Some(min_single) = min_single else {
            return Verdict::Score;
        };
        if min_single * doc_factor <= lowest {
            trace!("single bound {min_single} x {doc_factor} <= {lowest}");
            return Verdict::PrunedMaxScore;
        }

        let pivots = if self.all_pairs {
            0..infos.len()
        } else {
            match pivot {
                Some(p) => p..p + 1,
                None => return Verdict::Score,
            }
        };
        for p in pivots {
            let Some(bound_p) = self.bounds.get(p).copied().flatten() else {
                continue;
            };
            for i in 0..infos.len() {
                if i == p || (self.all_pairs && i < p) {
                    continue;
                }
                let Some(bound_i) = self.bounds[i] else {
                    continue;
                };
                let ub = self.pair_bound(p, i, &sources[p], &sources[i], bound_p, bound_i);
                if ub * doc_factor <= lowest {
                    trace!("pair bound ({p}, {i}) {ub} x {doc_factor} <= {lowest}");
                    return Verdict::PrunedDistance;
                }
            }
        }
        Verdict::Score
    }
}
