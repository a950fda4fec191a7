//! Sliding window over the body postings of one document.
//!
//! The window holds one body posting per scored term-info. It starts at the
//! first body posting of every term and repeatedly advances the term whose
//! posting comes first; the window whose weakest pair is strongest wins.
//! Pair scores are then computed with body postings pinned to that window.

use log::trace;

use crate::ranking::explain::PairScore;
use crate::ranking::merge::MergedDoc;
use crate::ranking::scoring::{MIN_SEED, NO_SCORE, ScoreMatrix, Scorer};

const NO_WINDOW: f32 = -2.0;

/// Reusable cursor and window buffers.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    cursors: Vec<Option<usize>>,
    window: Vec<Option<usize>>,
}

impl SlidingWindow {
    pub fn new(num_infos: usize) -> Self {
        Self {
            cursors: vec![None; num_infos],
            window: vec![None; num_infos],
        }
    }

    /// Posting index per term-info of the best window found by the last
    /// [`score`](Self::score) call.
    pub fn window(&self) -> &[Option<usize>] {
        &self.window
    }

    /// Pair component of the document score: the smallest pair score over
    /// every scored pair present in the document, with body postings taken
    /// from the best window. [`NO_SCORE`] when there is no such pair.
    pub fn score(
        &mut self,
        scorer: &Scorer<'_>,
        doc: &MergedDoc,
        best_non_body: &[Option<usize>],
        matrix: &ScoreMatrix,
        mut explain: Option<&mut Vec<PairScore>>,
    ) -> f32 {
        let infos = scorer.infos();
        let n = infos.len();
        self.cursors.clear();
        self.cursors.resize(n, None);
        self.window.clear();
        self.window.resize(n, None);

        for (i, info) in infos.iter().enumerate() {
            if info.is_scored() {
                self.cursors[i] = doc.stream(i).and_then(|s| s.next_body(0));
            }
        }

        let mut best = NO_WINDOW;
        let mut slides = 0usize;
        'slide: loop {
            let score = self.evaluate(scorer, doc, best_non_body, matrix);
            if score > best {
                best = score;
                self.window.copy_from_slice(&self.cursors);
            }
            slides += 1;

            loop {
                let Some(min) = self.min_cursor(doc) else {
                    break 'slide;
                };
                let next = match (self.cursors[min], doc.stream(min)) {
                    (Some(idx), Some(stream)) => stream.next_body(idx + 1),
                    _ => None,
                };
                self.cursors[min] = next;
                if next.is_some() {
                    break;
                }
            }
        }
        trace!(
            "doc {}: {slides} windows, best window score {best}",
            doc.doc_id()
        );

        let mut min = NO_SCORE;
        for i in 0..n {
            if !infos[i].is_scored() {
                continue;
            }
            let Some(a) = doc.stream(i) else {
                continue;
            };
            for j in i + 1..n {
                if !infos[j].is_scored() {
                    continue;
                }
                let Some(b) = doc.stream(j) else {
                    continue;
                };
                let score =
                    scorer.term_pair_score_for_any(i, j, a, b, &self.window, explain.as_deref_mut());
                if score >= min && min >= 0.0 {
                    continue;
                }
                min = score;
            }
        }
        min
    }

    /// Term-info whose current body posting comes first. Ties go to the
    /// lower term-info.
    fn min_cursor(&self, doc: &MergedDoc) -> Option<usize> {
        let mut min: Option<(usize, u32)> = None;
        for (i, cursor) in self.cursors.iter().enumerate() {
            let (Some(idx), Some(stream)) = (*cursor, doc.stream(i)) else {
                continue;
            };
            let pos = stream.get(idx).word_pos();
            if min.is_none_or(|(_, p)| pos < p) {
                min = Some((i, pos));
            }
        }
        min.map(|(i, _)| i)
    }

    /// Weakest pair of the current window.
    fn evaluate(
        &self,
        scorer: &Scorer<'_>,
        doc: &MergedDoc,
        best_non_body: &[Option<usize>],
        matrix: &ScoreMatrix,
    ) -> f32 {
        let infos = scorer.infos();
        let fixed = scorer.weights().fixed_distance;
        let mut min = MIN_SEED;
        let mut found = false;
        let mut all_special = true;
        let mut scored = false;

        for i in 0..infos.len() {
            if !infos[i].is_scored() {
                continue;
            }
            all_special = false;
            let (Some(ci), Some(si)) = (self.cursors[i], doc.stream(i)) else {
                continue;
            };
            found = true;
            let ka = si.get(ci);
            let nb_i = best_non_body[i].map(|idx| si.get(idx));

            for j in i + 1..infos.len() {
                if !infos[j].is_scored() {
                    continue;
                }
                let (Some(cj), Some(sj)) = (self.cursors[j], doc.stream(j)) else {
                    continue;
                };
                let kb = sj.get(cj);
                let nb_j = best_non_body[j].map(|idx| sj.get(idx));
                let geometry = scorer.pair_geometry(i, j);

                let mut max = scorer.pair_score(Some(ka), Some(kb), 0, geometry.qdist);
                scored = true;
                max = max.max(scorer.pair_score(nb_i, Some(kb), fixed, geometry.qdist));
                max = max.max(scorer.pair_score(nb_i, nb_j, fixed, geometry.qdist));
                max = max.max(scorer.pair_score(Some(ka), nb_j, fixed, geometry.qdist));
                max *= geometry.wiki_weight;
                max *= infos[i].freq_weight * infos[j].freq_weight;
                let cell = matrix.get(i, j);
                if cell > max {
                    max = cell;
                }

                if scorer.in_same_quoted_phrase(i, j) {
                    let dist = kb.word_pos() as i32 - ka.word_pos() as i32;
                    let qdist = infos[j].qpos - infos[i].qpos;
                    if dist < 0 || (dist - qdist).abs() > 1 {
                        max = NO_SCORE;
                    }
                }
                if max < min {
                    min = max;
                }
            }
        }

        if !found || (!scored && !all_special) {
            return NO_SCORE;
        }
        min
    }
}
