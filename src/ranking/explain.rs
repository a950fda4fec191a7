//! Score breakdowns collected by the explain pass.

use std::ops::Range;

use log::warn;
use serde::Serialize;

use crate::posting::HashGroup;

/// One top slot of a single-term score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleScore {
    pub qterm: usize,
    pub word_pos: u32,
    pub hash_group: HashGroup,
    pub density_rank: u8,
    pub diversity_rank: u8,
    pub word_spam_rank: u8,
    pub is_synonym: bool,
    pub is_half_stop_wiki_bigram: bool,
    pub tf_weight: f32,
    /// Sublist flag bits of the term-info.
    pub flags: u8,
    pub final_score: f32,
}

/// One top slot of a term-pair score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairScore {
    pub qterm_i: usize,
    pub qterm_j: usize,
    pub word_pos_i: u32,
    pub word_pos_j: u32,
    pub hash_group_i: HashGroup,
    pub hash_group_j: HashGroup,
    pub density_rank_i: u8,
    pub density_rank_j: u8,
    pub diversity_rank_i: u8,
    pub diversity_rank_j: u8,
    pub word_spam_rank_i: u8,
    pub word_spam_rank_j: u8,
    pub is_synonym_i: bool,
    pub is_synonym_j: bool,
    pub is_half_stop_wiki_bigram_i: bool,
    pub is_half_stop_wiki_bigram_j: bool,
    pub tf_weight_i: f32,
    pub tf_weight_j: f32,
    pub flags_i: u8,
    pub flags_j: u8,
    pub qdist: i32,
    /// The pair was scored at the fixed distance.
    pub fixed_distance: bool,
    pub in_same_wiki_phrase: bool,
    pub final_score: f32,
}

/// Explanation of one document's score.
///
/// `singles` and `pairs` index the slot vectors of the owning
/// [`ExplainBuffer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocIdScore {
    pub doc_id: u64,
    pub site_rank: u8,
    pub lang: u8,
    pub highest_inlink_site_rank: Option<u8>,
    pub flags: u32,
    pub min_single_score: f32,
    pub min_pair_score: f32,
    pub final_score: f32,
    pub int_score: Option<i32>,
    pub singles: Range<usize>,
    pub pairs: Range<usize>,
}

impl DocIdScore {
    pub fn new(doc_id: u64) -> Self {
        Self {
            doc_id,
            site_rank: 0,
            lang: 0,
            highest_inlink_site_rank: None,
            flags: 0,
            min_single_score: -1.0,
            min_pair_score: -1.0,
            final_score: 0.0,
            int_score: None,
            singles: 0..0,
            pairs: 0..0,
        }
    }
}

/// A document explanation with its slots resolved.
#[derive(Debug, Clone, Serialize)]
pub struct DocExplanation<'a> {
    #[serde(flatten)]
    pub doc: &'a DocIdScore,
    pub single_scores: &'a [SingleScore],
    pub pair_scores: &'a [PairScore],
}

/// Explanations of the retained documents.
///
/// The buffer can outlive one evaluation; entries for documents that have
/// since left the top-K are removed with [`retain_docs`](Self::retain_docs).
#[derive(Debug, Clone, Default)]
pub struct ExplainBuffer {
    capacity: usize,
    docs: Vec<DocIdScore>,
    singles: Vec<SingleScore>,
    pairs: Vec<PairScore>,
}

impl ExplainBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            docs: Vec::with_capacity(capacity),
            singles: Vec::new(),
            pairs: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow the buffer to hold at least `capacity` documents.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        self.capacity = self.capacity.max(capacity);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.singles.clear();
        self.pairs.clear();
    }

    /// Keep only the documents for which `keep` returns true.
    ///
    /// Returns the number of removed entries.
    pub fn retain_docs<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(u64) -> bool,
    {
        let before = self.docs.len();
        let kept: Vec<bool> = self.docs.iter().map(|d| keep(d.doc_id)).collect();
        if kept.iter().all(|&k| k) {
            return 0;
        }
        let docs = std::mem::take(&mut self.docs);
        let singles = std::mem::take(&mut self.singles);
        let pairs = std::mem::take(&mut self.pairs);
        for (mut doc, _) in docs.into_iter().zip(kept).filter(|(_, k)| *k) {
            let s = self.singles.len();
            self.singles.extend_from_slice(&singles[doc.singles.clone()]);
            doc.singles = s..self.singles.len();
            let p = self.pairs.len();
            self.pairs.extend_from_slice(&pairs[doc.pairs.clone()]);
            doc.pairs = p..self.pairs.len();
            self.docs.push(doc);
        }
        before - self.docs.len()
    }

    /// Store the explanation of one document.
    ///
    /// Re-adding the document that was added last replaces it. When the
    /// buffer is full one entry whose document is no longer retained
    /// (`in_top` is false) is dropped to make room; without such an entry
    /// the explanation is discarded and false is returned.
    pub fn add<F>(
        &mut self,
        mut doc: DocIdScore,
        singles: &[SingleScore],
        pairs: &[PairScore],
        in_top: F,
    ) -> bool
    where
        F: Fn(u64) -> bool,
    {
        if self.docs.last().is_some_and(|last| last.doc_id == doc.doc_id) {
            // The last entry owns the tail of both slot vectors.
            if let Some(last) = self.docs.pop() {
                self.singles.truncate(last.singles.start);
                self.pairs.truncate(last.pairs.start);
            }
        }
        if self.docs.len() >= self.capacity {
            let Some(victim) = self.docs.iter().map(|d| d.doc_id).find(|&id| !in_top(id)) else {
                warn!(
                    "explain buffer full ({} entries), dropping explanation of doc {}",
                    self.capacity, doc.doc_id
                );
                return false;
            };
            self.retain_docs(|id| id != victim);
        }

        let s = self.singles.len();
        self.singles.extend_from_slice(singles);
        doc.singles = s..self.singles.len();
        let p = self.pairs.len();
        self.pairs.extend_from_slice(pairs);
        doc.pairs = p..self.pairs.len();
        self.docs.push(doc);
        true
    }

    pub fn docs(&self) -> &[DocIdScore] {
        &self.docs
    }

    pub fn get(&self, doc_id: u64) -> Option<&DocIdScore> {
        self.docs.iter().rev().find(|d| d.doc_id == doc_id)
    }

    pub fn singles_of(&self, doc: &DocIdScore) -> &[SingleScore] {
        self.singles.get(doc.singles.clone()).unwrap_or_default()
    }

    pub fn pairs_of(&self, doc: &DocIdScore) -> &[PairScore] {
        self.pairs.get(doc.pairs.clone()).unwrap_or_default()
    }

    /// Every stored explanation in insertion order.
    pub fn explanations(&self) -> impl Iterator<Item = DocExplanation<'_>> {
        self.docs.iter().map(|doc| DocExplanation {
            doc,
            single_scores: self.singles_of(doc),
            pair_scores: self.pairs_of(doc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(qterm: usize, score: f32) -> SingleScore {
        SingleScore {
            qterm,
            word_pos: 1,
            hash_group: HashGroup::Body,
            density_rank: 31,
            diversity_rank: 15,
            word_spam_rank: 15,
            is_synonym: false,
            is_half_stop_wiki_bigram: false,
            tf_weight: 1.0,
            flags: 0,
            final_score: score,
        }
    }

    fn doc(id: u64, score: f32) -> DocIdScore {
        DocIdScore {
            final_score: score,
            ..DocIdScore::new(id)
        }
    }

    #[test]
    fn test_add_and_resolve() {
        let mut buf = ExplainBuffer::new(4);
        assert!(buf.add(doc(1, 5.0), &[single(0, 5.0)], &[], |_| true));
        assert!(buf.add(doc(2, 3.0), &[single(0, 1.0), single(1, 2.0)], &[], |_| true));
        let second = buf.get(2).unwrap();
        assert_eq!(buf.singles_of(second).len(), 2);
        assert_eq!(buf.singles_of(second)[1].qterm, 1);
        assert_eq!(buf.explanations().count(), 2);
    }

    #[test]
    fn test_readd_last_overwrites() {
        let mut buf = ExplainBuffer::new(4);
        buf.add(doc(1, 5.0), &[single(0, 5.0)], &[], |_| true);
        buf.add(doc(1, 6.0), &[single(0, 6.0), single(1, 1.0)], &[], |_| true);
        assert_eq!(buf.len(), 1);
        let entry = buf.get(1).unwrap();
        assert_eq!(entry.final_score, 6.0);
        assert_eq!(buf.singles_of(entry).len(), 2);
    }

    #[test]
    fn test_full_buffer_kicks_out_evicted() {
        let mut buf = ExplainBuffer::new(2);
        buf.add(doc(1, 1.0), &[single(0, 1.0)], &[], |_| true);
        buf.add(doc(2, 2.0), &[single(0, 2.0)], &[], |_| true);
        // Document 1 has left the top-K.
        assert!(buf.add(doc(3, 3.0), &[single(0, 3.0)], &[], |id| id != 1));
        let ids: Vec<u64> = buf.docs().iter().map(|d| d.doc_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(buf.singles_of(buf.get(3).unwrap())[0].final_score, 3.0);
        // Nothing to kick out.
        assert!(!buf.add(doc(4, 4.0), &[], &[], |_| true));
    }

    #[test]
    fn test_retain_rewrites_ranges() {
        let mut buf = ExplainBuffer::new(3);
        buf.add(doc(1, 1.0), &[single(0, 1.0), single(1, 1.5)], &[], |_| true);
        buf.add(doc(2, 2.0), &[single(0, 2.0)], &[], |_| true);
        assert_eq!(buf.retain_docs(|id| id == 2), 1);
        let entry = buf.get(2).unwrap();
        assert_eq!(entry.singles, 0..1);
        assert_eq!(buf.singles_of(entry)[0].final_score, 2.0);
    }
}
