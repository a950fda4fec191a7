//! Single-term and term-pair scoring of one merged document.
//!
//! Every score is a product of per-posting weights looked up in
//! [`ScoringWeights`] and, for pairs, divided by the word distance plus one.
//! Negative values mean "no score".

use log::trace;
use tinyvec::ArrayVec;

use crate::config::MAX_TOP;
use crate::posting::{HashGroup, PostingKey};
use crate::ranking::explain::{PairScore, SingleScore};
use crate::ranking::merge::{MergedDoc, MergedStream};
use crate::ranking::request::RankingRequest;
use crate::ranking::term_info::TermInfo;
use crate::weights::ScoringWeights;

/// Returned when there is nothing to score.
pub const NO_SCORE: f32 = -1.0;

/// Start value of running minimums.
pub(crate) const MIN_SEED: f32 = 999_999_999.0;

/// Pairs further apart than this in a non-body zone use the fixed distance.
const NON_BODY_FIX_DISTANCE: i32 = 50;

/// Query distance assumed between terms that share no wiki phrase.
pub(crate) const DEFAULT_QDIST: i32 = 2;

/// Site rank lifted a third of the way towards the best linking site.
pub fn adjusted_site_rank(site_rank: u8, highest_inlink_site_rank: Option<u8>) -> f32 {
    let sr = f32::from(site_rank);
    match highest_inlink_site_rank {
        Some(inlink) if inlink > site_rank => sr + (f32::from(inlink) - sr) / 3.0,
        _ => sr,
    }
}

trait Scored {
    fn score(&self) -> f32;
}

/// At most `max_top` best slots, one per "group" as decided by the caller.
#[derive(Debug)]
struct TopSlots<T: Default> {
    slots: ArrayVec<[T; MAX_TOP]>,
    max_top: usize,
    lowest: usize,
}

impl<T: Default + Scored> TopSlots<T> {
    fn new(max_top: usize) -> Self {
        Self {
            slots: ArrayVec::new(),
            max_top: max_top.clamp(1, MAX_TOP),
            lowest: 0,
        }
    }

    /// Offer a slot. A slot in the same group is replaced when beaten; a new
    /// group takes a free slot or replaces the lowest one.
    fn offer<F>(&mut self, slot: T, same_group: F)
    where
        F: Fn(&T) -> bool,
    {
        if let Some(k) = self.slots.iter().position(same_group) {
            if slot.score() > self.slots[k].score() {
                self.slots[k] = slot;
            }
        } else if self.slots.len() < self.max_top {
            self.slots.push(slot);
        } else if slot.score() > self.slots[self.lowest].score() {
            self.slots[self.lowest] = slot;
        }

        if self.slots.len() >= self.max_top {
            // Ties move the marker to the later slot.
            self.lowest = 0;
            for k in 1..self.max_top {
                if self.slots[k].score() > self.slots[self.lowest].score() {
                    continue;
                }
                self.lowest = k;
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SingleSlot {
    score: f32,
    idx: usize,
    mhg: HashGroup,
}

impl Scored for SingleSlot {
    fn score(&self) -> f32 {
        self.score
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PairSlot {
    score: f32,
    idx_i: usize,
    idx_j: usize,
    mhg_i: HashGroup,
    mhg_j: HashGroup,
    fixed: bool,
}

impl Scored for PairSlot {
    fn score(&self) -> f32 {
        self.score
    }
}

/// Query-side distance and weight of a term pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairGeometry {
    pub qdist: i32,
    pub wiki_weight: f32,
    pub in_same_wiki_phrase: bool,
}

/// Best non-body pair scores of the current document, upper triangle of a
/// term-info × term-info matrix.
#[derive(Debug, Clone, Default)]
pub struct ScoreMatrix {
    n: usize,
    cells: Vec<f32>,
}

impl ScoreMatrix {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cells: vec![NO_SCORE; n * n],
        }
    }

    pub fn reset(&mut self) {
        self.cells.fill(NO_SCORE);
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.cells[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, score: f32) {
        self.cells[i * self.n + j] = score;
    }
}

/// Result of scoring one term on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleTermScore {
    pub sum: f32,
    /// Index of the highest scoring posting outside the body zones.
    pub best_non_body: Option<usize>,
}

/// Scores documents against one query's term-infos.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
    infos: &'a [TermInfo],
    synonym_weight: f32,
    max_top: usize,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: &'a ScoringWeights, infos: &'a [TermInfo], request: &RankingRequest) -> Self {
        Self {
            weights,
            infos,
            synonym_weight: request.synonym_weight,
            max_top: request.max_top(),
        }
    }

    pub fn weights(&self) -> &'a ScoringWeights {
        self.weights
    }

    pub fn infos(&self) -> &'a [TermInfo] {
        self.infos
    }

    pub fn synonym_weight(&self) -> f32 {
        self.synonym_weight
    }

    pub fn max_top(&self) -> usize {
        self.max_top
    }

    /// Word spam weight, or the linker weight for link text.
    #[inline]
    fn spam_weight(&self, key: PostingKey<'_>) -> f32 {
        if key.hash_group().is_link_text() {
            self.weights.linker(key.word_spam_rank())
        } else {
            self.weights.word_spam(key.word_spam_rank())
        }
    }

    /// Per-side factor of a pair score.
    #[inline]
    fn pair_side_weight(&self, key: PostingKey<'_>) -> f32 {
        self.pair_side_weight_as(key, key.is_synonym())
    }

    /// [`pair_side_weight`](Self::pair_side_weight) with the synonym bit
    /// given explicitly.
    #[inline]
    pub(crate) fn pair_side_weight_as(&self, key: PostingKey<'_>, synonym: bool) -> f32 {
        let mut w = self.weights.density(key.density_rank())
            * self.weights.hash_group(key.hash_group())
            * self.spam_weight(key);
        if synonym {
            w *= self.synonym_weight;
        }
        w
    }

    /// Score of one occurrence on its own, before frequency weighting.
    fn occurrence_score(&self, key: PostingKey<'_>) -> f32 {
        self.occurrence_score_as(key, key.is_synonym())
    }

    pub(crate) fn occurrence_score_as(&self, key: PostingKey<'_>, synonym: bool) -> f32 {
        let div = self.weights.diversity(key.diversity_rank());
        let hg = self.weights.hash_group(key.hash_group());
        let dens = self.weights.density(key.density_rank());
        let spam = self.spam_weight(key);
        let mut score = 100.0 * div * div * hg * hg * dens * dens * spam * spam;
        if synonym {
            score *= self.synonym_weight * self.synonym_weight;
        }
        score
    }

    /// Sum of the best occurrence per reduced hash group of term-info `i`.
    ///
    /// Link-text occurrences each get their own slot.
    pub fn single_term_score(
        &self,
        i: usize,
        stream: MergedStream<'_>,
        explain: Option<&mut Vec<SingleScore>>,
    ) -> SingleTermScore {
        let mut top: TopSlots<SingleSlot> = TopSlots::new(self.max_top);
        let mut non_body_max = NO_SCORE;
        let mut best_non_body = None;

        for (idx, key) in stream.iter().enumerate() {
            let hg = key.hash_group();
            let mhg = hg.reduced();
            let score = self.occurrence_score(key);
            top.offer(SingleSlot { score, idx, mhg }, |slot| {
                slot.mhg == mhg && !hg.is_link_text()
            });
            if score > non_body_max && !hg.is_body() {
                non_body_max = score;
                best_non_body = Some(idx);
            }
        }

        let wbw = self.weights.wiki_bigram_weight;
        let fw = self.infos[i].freq_weight;
        let slot_final = |slot: &SingleSlot| {
            if stream.get(slot.idx).is_half_stop_wiki_bigram() {
                slot.score * wbw * wbw
            } else {
                slot.score
            }
        };
        let sum: f32 = top.iter().map(slot_final).sum::<f32>() * fw * fw;

        if let Some(out) = explain {
            let info = &self.infos[i];
            for slot in top.iter() {
                let key = stream.get(slot.idx);
                out.push(SingleScore {
                    qterm: info.qterm,
                    word_pos: key.word_pos(),
                    hash_group: key.hash_group(),
                    density_rank: key.density_rank(),
                    diversity_rank: key.diversity_rank(),
                    word_spam_rank: key.word_spam_rank(),
                    is_synonym: key.is_synonym(),
                    is_half_stop_wiki_bigram: key.is_half_stop_wiki_bigram(),
                    tf_weight: fw,
                    flags: info.flags.bits(),
                    final_score: slot_final(slot) * fw * fw,
                });
            }
        }

        SingleTermScore { sum, best_non_body }
    }

    /// Smallest single-term score over the scored term-infos present in the
    /// document.
    ///
    /// Fills `best_non_body` per term-info. Returns [`NO_SCORE`] when no
    /// term-info is present, or when only bigram-style matches exist for
    /// scored terms.
    pub fn min_single_term_score_sum(
        &self,
        doc: &MergedDoc,
        best_non_body: &mut [Option<usize>],
        mut explain: Option<&mut Vec<SingleScore>>,
    ) -> f32 {
        let mut min = MIN_SEED;
        let mut found = false;
        let mut all_special = true;
        let mut scored = false;

        for (i, info) in self.infos.iter().enumerate() {
            best_non_body[i] = None;
            let Some(stream) = doc.stream(i) else {
                continue;
            };
            found = true;
            if !info.is_scored() {
                continue;
            }
            all_special = false;
            let single = self.single_term_score(i, stream, explain.as_deref_mut());
            best_non_body[i] = single.best_non_body;
            scored = true;
            if single.sum < min {
                min = single.sum;
            }
        }

        if !found || (!scored && !all_special) {
            return NO_SCORE;
        }
        min
    }

    /// Query distance and wiki weight of the pair `i < j`.
    pub fn pair_geometry(&self, i: usize, j: usize) -> PairGeometry {
        let (a, b) = (&self.infos[i], &self.infos[j]);
        if a.wiki_phrase_id != 0 && a.wiki_phrase_id == b.wiki_phrase_id {
            PairGeometry {
                qdist: b.qpos - a.qpos,
                wiki_weight: self.weights.wiki_weight,
                in_same_wiki_phrase: true,
            }
        } else {
            PairGeometry {
                qdist: DEFAULT_QDIST,
                wiki_weight: 1.0,
                in_same_wiki_phrase: false,
            }
        }
    }

    /// Whether both term-infos come from the same quoted phrase.
    pub fn in_same_quoted_phrase(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.infos[i], &self.infos[j]);
        a.quoted_start.is_some() && a.quoted_start == b.quoted_start
    }

    /// Best pairing of two non-body occurrences of the streams.
    pub fn max_non_body_pair(&self, a: MergedStream<'_>, b: MergedStream<'_>, qdist: i32) -> f32 {
        if a.is_empty() || b.is_empty() {
            return NO_SCORE;
        }
        let fixed_distance = self.weights.fixed_distance;
        let mut max = NO_SCORE;
        let (mut ia, mut ib) = (0, 0);

        loop {
            let ka = a.get(ia);
            let kb = b.get(ib);
            let p1 = ka.word_pos() as i32;
            let p2 = kb.word_pos() as i32;
            let compatible = ka.hash_group().is_compatible(kb.hash_group());

            if p1 <= p2 {
                if compatible {
                    let mut dist = (p2 - p1).max(2);
                    if dist > NON_BODY_FIX_DISTANCE {
                        dist = fixed_distance;
                    }
                    if dist >= qdist {
                        dist -= qdist;
                    }
                    let score = 100.0 * self.pair_side_weight(ka) * self.pair_side_weight(kb)
                        / (dist as f32 + 1.0);
                    max = max.max(score);
                }
                ia += 1;
                if ia >= a.len() {
                    break;
                }
            } else {
                if compatible {
                    let mut dist = (p1 - p2).max(2);
                    if dist > NON_BODY_FIX_DISTANCE {
                        dist = fixed_distance;
                    }
                    // One unit for the wrong order.
                    dist = if dist >= qdist { dist - 1 } else { dist + 1 };
                    let score = 100.0 * self.pair_side_weight(ka) * self.pair_side_weight(kb)
                        / (dist as f32 + 1.0);
                    max = max.max(score);
                }
                ib += 1;
                if ib >= b.len() {
                    break;
                }
            }
        }
        max
    }

    /// Score of one pairing. A non-zero `fixed` replaces the measured
    /// distance.
    pub fn pair_score(
        &self,
        a: Option<PostingKey<'_>>,
        b: Option<PostingKey<'_>>,
        fixed: i32,
        qdist: i32,
    ) -> f32 {
        let (Some(a), Some(b)) = (a, b) else {
            return NO_SCORE;
        };
        let dist = if fixed != 0 {
            fixed
        } else {
            let p1 = a.word_pos() as i32;
            let p2 = b.word_pos() as i32;
            let mut dist = (p2 - p1).abs().max(2);
            if dist >= qdist {
                dist -= qdist;
            }
            if p2 < p1 {
                dist += 1;
            }
            dist
        };
        100.0 * self.pair_side_weight(a) * self.pair_side_weight(b) / (dist as f32 + 1.0)
    }

    /// Fill `matrix` with the best non-body pairing of every scored pair.
    pub fn non_body_matrix(&self, doc: &MergedDoc, matrix: &mut ScoreMatrix) {
        let n = self.infos.len();
        for i in 0..n {
            if !self.infos[i].is_scored() {
                continue;
            }
            for j in i + 1..n {
                if !self.infos[j].is_scored() {
                    continue;
                }
                let geometry = self.pair_geometry(i, j);
                let max = match (doc.stream(i), doc.stream(j)) {
                    (Some(a), Some(b)) => self.max_non_body_pair(a, b, geometry.qdist),
                    _ => NO_SCORE,
                };
                let cell = if max < 0.0 {
                    NO_SCORE
                } else {
                    geometry.wiki_weight
                        * max
                        * self.infos[i].freq_weight
                        * self.infos[j].freq_weight
                };
                matrix.set(i, j, cell);
            }
        }
    }

    /// Distance of two positions in different zones of the document.
    #[inline]
    fn fix_distance(&self, dist: &mut i32, mhg_i: HashGroup, mhg_j: HashGroup) -> bool {
        if *dist < NON_BODY_FIX_DISTANCE {
            return false;
        }
        if mhg_i != mhg_j || mhg_i.is_link_text() {
            *dist = self.weights.fixed_distance;
            return true;
        }
        false
    }

    /// Final score of the pair `i < j`.
    ///
    /// Body occurrences only count at the position recorded in `window`;
    /// every other zone is scanned in full. One slot is kept per hash-group
    /// pairing, link text excepted.
    pub fn term_pair_score_for_any(
        &self,
        i: usize,
        j: usize,
        a: MergedStream<'_>,
        b: MergedStream<'_>,
        window: &[Option<usize>],
        explain: Option<&mut Vec<PairScore>>,
    ) -> f32 {
        let geometry = self.pair_geometry(i, j);
        let quoted = self.in_same_quoted_phrase(i, j);
        let qdist = if quoted {
            self.infos[j].qpos - self.infos[i].qpos
        } else {
            geometry.qdist
        };
        let wbw = self.weights.wiki_bigram_weight;
        let side = |key: PostingKey<'_>| {
            let w = self.pair_side_weight(key);
            if key.is_half_stop_wiki_bigram() { w * wbw } else { w }
        };

        let mut top: TopSlots<PairSlot> = TopSlots::new(self.max_top);
        let (mut ia, mut ib) = (0, 0);

        while ia < a.len() && ib < b.len() {
            let ka = a.get(ia);
            let kb = b.get(ib);
            let (hg_i, hg_j) = (ka.hash_group(), kb.hash_group());
            if hg_i.is_body() && window[i] != Some(ia) {
                ia += 1;
                continue;
            }
            if hg_j.is_body() && window[j] != Some(ib) {
                ib += 1;
                continue;
            }
            let (mhg_i, mhg_j) = (hg_i.reduced(), hg_j.reduced());
            let p1 = ka.word_pos() as i32;
            let p2 = kb.word_pos() as i32;

            let scored = if p1 <= p2 {
                let raw = p2 - p1;
                let slot = if quoted && (raw - qdist).abs() >= 2 {
                    None
                } else {
                    let mut dist = raw.max(2);
                    let fixed = self.fix_distance(&mut dist, mhg_i, mhg_j);
                    if dist >= qdist {
                        dist -= qdist;
                    }
                    Some((dist, fixed))
                };
                slot.map(|s| (s, ia, ib))
            } else if quoted {
                None
            } else {
                let mut dist = (p1 - p2).max(2);
                let fixed = self.fix_distance(&mut dist, mhg_i, mhg_j);
                dist = if dist >= qdist { dist - 1 } else { dist + 1 };
                Some(((dist, fixed), ia, ib))
            };

            if let Some(((dist, fixed), idx_i, idx_j)) = scored {
                let score = 100.0 * side(ka) * side(kb) / (dist as f32 + 1.0);
                top.offer(
                    PairSlot {
                        score,
                        idx_i,
                        idx_j,
                        mhg_i,
                        mhg_j,
                        fixed,
                    },
                    |slot| {
                        (slot.mhg_i == mhg_i && !hg_i.is_link_text())
                            || (slot.mhg_j == mhg_j && !hg_j.is_link_text())
                    },
                );
            }

            if p1 <= p2 {
                ia += 1;
            } else {
                ib += 1;
            }
        }

        let (fw_i, fw_j) = (self.infos[i].freq_weight, self.infos[j].freq_weight);
        let scale = geometry.wiki_weight * fw_i * fw_j;
        let sum: f32 = top.iter().map(|s| s.score).sum::<f32>() * scale;
        trace!("pair ({i}, {j}): {} slots, sum {sum}", top.slots.len());

        if let Some(out) = explain {
            let (info_i, info_j) = (&self.infos[i], &self.infos[j]);
            for slot in top.iter() {
                let ka = a.get(slot.idx_i);
                let kb = b.get(slot.idx_j);
                out.push(PairScore {
                    qterm_i: info_i.qterm,
                    qterm_j: info_j.qterm,
                    word_pos_i: ka.word_pos(),
                    word_pos_j: kb.word_pos(),
                    hash_group_i: ka.hash_group(),
                    hash_group_j: kb.hash_group(),
                    density_rank_i: ka.density_rank(),
                    density_rank_j: kb.density_rank(),
                    diversity_rank_i: ka.diversity_rank(),
                    diversity_rank_j: kb.diversity_rank(),
                    word_spam_rank_i: ka.word_spam_rank(),
                    word_spam_rank_j: kb.word_spam_rank(),
                    is_synonym_i: ka.is_synonym(),
                    is_synonym_j: kb.is_synonym(),
                    is_half_stop_wiki_bigram_i: ka.is_half_stop_wiki_bigram(),
                    is_half_stop_wiki_bigram_j: kb.is_half_stop_wiki_bigram(),
                    tf_weight_i: fw_i,
                    tf_weight_j: fw_j,
                    flags_i: info_i.flags.bits(),
                    flags_j: info_j.flags.bits(),
                    qdist,
                    fixed_distance: slot.fixed,
                    in_same_wiki_phrase: geometry.in_same_wiki_phrase,
                    final_score: slot.score * scale,
                });
            }
        }

        sum
    }
}
