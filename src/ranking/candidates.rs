//! Candidate document resolution.
//!
//! Plain queries intersect the term-infos by voting: the rarest term-info
//! seeds the candidate buffer, each further term-info votes for the entries
//! it contains, and entries that missed a vote are dropped. Negative
//! term-infos remove their documents at the end.
//!
//! Boolean queries collect a bit vector per document over all term-infos
//! and evaluate the query expression once per distinct vector.

use ahash::AHashMap;
use bit_vec::BitVec;
use log::debug;

use crate::error::{RankError, Result};
use crate::lookup::SiteWhitelist;
use crate::posting::{DocBlock, WorkingList};
use crate::query::{Query, RangeFilter};
use crate::ranking::term_info::{TermGrouping, TermInfo};

/// Vote value marking an entry for removal.
pub const VOTE_REMOVED: u8 = 255;

/// Highest pass number before wrapping back to 1.
const MAX_VOTE_PASS: u8 = 254;

/// One entry of the candidate buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub doc_id: u64,
    /// Pass number of the last vote.
    pub vote: u8,
}

/// The resolved candidate documents of a query.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<Candidate>,
    /// Per-document term-info bits of a boolean query.
    bits: Option<AHashMap<u64, BitVec>>,
}

fn next_pass(pass: u8) -> u8 {
    if pass >= MAX_VOTE_PASS { 1 } else { pass + 1 }
}

/// Positive document blocks of a list.
fn positive_blocks(list: &WorkingList) -> impl Iterator<Item = DocBlock<'_>> {
    list.blocks().filter(|b| !b.is_delete_marker())
}

fn in_range(range: Option<RangeFilter>, block: &DocBlock<'_>) -> bool {
    range.is_none_or(|r| r.accepts_any(block.keys()))
}

fn whitelisted(whitelist: Option<&dyn SiteWhitelist>, doc_id: u64) -> bool {
    whitelist.is_none_or(|w| w.is_in_whitelist(doc_id))
}

impl CandidateSet {
    /// Resolve the candidates of `query`.
    pub fn resolve(
        query: &Query,
        grouping: &TermGrouping,
        lists: &[WorkingList],
        whitelist: Option<&dyn SiteWhitelist>,
    ) -> Result<Self> {
        if grouping.is_empty() {
            debug!("no required terms in query");
            return Ok(Self::default());
        }
        match &query.expression {
            Some(_) => Self::resolve_boolean(query, grouping, lists, whitelist),
            None => Self::resolve_by_votes(grouping, lists, whitelist),
        }
    }

    fn resolve_by_votes(
        grouping: &TermGrouping,
        lists: &[WorkingList],
        whitelist: Option<&dyn SiteWhitelist>,
    ) -> Result<Self> {
        let Some(pivot) = grouping.pivot else {
            return Ok(Self::default());
        };
        if grouping.pivot_size() == 0 {
            return Ok(Self::default());
        }

        let mut entries = Self::rarest_term_entries(&grouping.infos[pivot], lists, whitelist)?;
        debug!("rarest term-info #{pivot} seeded {} candidates", entries.len());

        let mut pass = 0;
        for (i, info) in grouping.infos.iter().enumerate() {
            if i == pivot || info.is_negative() {
                continue;
            }
            pass = next_pass(pass);
            add_votes(&mut entries, info, lists, pass);
            entries.retain(|c| c.vote == pass);
            debug!("after term-info #{i}: {} candidates", entries.len());
        }

        for (i, info) in grouping.infos.iter().enumerate() {
            if i == pivot || !info.is_negative() {
                continue;
            }
            remove_votes(&mut entries, info, lists);
            entries.retain(|c| c.vote != VOTE_REMOVED);
            debug!("after negative term-info #{i}: {} candidates", entries.len());
        }

        Ok(Self {
            entries,
            bits: None,
        })
    }

    /// Merge the pivot's sublists into an ascending, deduplicated buffer.
    fn rarest_term_entries(
        info: &TermInfo,
        lists: &[WorkingList],
        whitelist: Option<&dyn SiteWhitelist>,
    ) -> Result<Vec<Candidate>> {
        let capacity: usize = info
            .sublists
            .iter()
            .map(|s| lists[s.qterm].num_docs())
            .max()
            .unwrap_or(0);
        let mut entries = Vec::new();
        entries.try_reserve(capacity)?;

        let mut iters: Vec<_> = info
            .sublists
            .iter()
            .map(|s| positive_blocks(&lists[s.qterm]))
            .collect();
        let mut heads: Vec<Option<DocBlock<'_>>> = iters.iter_mut().map(|it| it.next()).collect();

        loop {
            let mut min: Option<u64> = None;
            for block in heads.iter().flatten() {
                if min.is_none_or(|m| block.doc_id() < m) {
                    min = Some(block.doc_id());
                }
            }
            let Some(doc_id) = min else {
                break;
            };

            let mut passes = false;
            for (head, iter) in heads.iter_mut().zip(iters.iter_mut()) {
                if let Some(block) = head.filter(|b| b.doc_id() == doc_id) {
                    passes |= in_range(info.range, &block);
                    *head = iter.next();
                }
            }
            if passes && whitelisted(whitelist, doc_id) {
                entries.try_reserve(1)?;
                entries.push(Candidate { doc_id, vote: 0 });
            }
        }
        Ok(entries)
    }

    fn resolve_boolean(
        query: &Query,
        grouping: &TermGrouping,
        lists: &[WorkingList],
        whitelist: Option<&dyn SiteWhitelist>,
    ) -> Result<Self> {
        let Some(expression) = &query.expression else {
            return Err(RankError::query("boolean resolution without an expression"));
        };
        let num_bits = grouping.len();
        let total_docs: usize = grouping
            .infos
            .iter()
            .flat_map(|info| info.sublists.iter())
            .map(|s| lists[s.qterm].num_docs())
            .sum();

        let mut vectors: AHashMap<u64, BitVec> = AHashMap::new();
        vectors.try_reserve(total_docs)?;

        for (ordinal, info) in grouping.infos.iter().enumerate() {
            for sub in &info.sublists {
                for block in positive_blocks(&lists[sub.qterm]) {
                    if !in_range(info.range, &block) {
                        continue;
                    }
                    if !whitelisted(whitelist, block.doc_id()) {
                        continue;
                    }
                    vectors
                        .entry(block.doc_id())
                        .or_insert_with(|| BitVec::from_elem(num_bits, false))
                        .set(ordinal, true);
                }
            }
        }

        let mut memo: AHashMap<BitVec, bool> = AHashMap::new();
        memo.try_reserve(vectors.len().min(1 << 16))?;
        let mut entries = Vec::new();
        entries.try_reserve(vectors.len())?;

        for (&doc_id, bits) in &vectors {
            let matched = match memo.get(bits) {
                Some(&value) => value,
                None => {
                    let value = expression.matches(&|qterm: usize| {
                        grouping
                            .bit_of_term
                            .get(qterm)
                            .copied()
                            .flatten()
                            .is_some_and(|bit| bits.get(bit).unwrap_or(false))
                    });
                    memo.insert(bits.clone(), value);
                    value
                }
            };
            if matched {
                entries.push(Candidate { doc_id, vote: 0 });
            }
        }
        entries.sort_unstable_by(|a, b| b.doc_id.cmp(&a.doc_id));
        vectors.retain(|_, bits| memo.get(bits).copied().unwrap_or(false));
        debug!(
            "boolean query: {} documents, {} distinct vectors, {} matches",
            total_docs,
            memo.len(),
            entries.len()
        );

        Ok(Self {
            entries,
            bits: Some(vectors),
        })
    }

    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|c| c.doc_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_boolean(&self) -> bool {
        self.bits.is_some()
    }

    /// Candidate ids in ascending order.
    pub fn ascending_ids(&self) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        ids.try_reserve_exact(self.entries.len())?;
        ids.extend(self.doc_ids());
        if self.is_boolean() {
            ids.reverse();
        }
        Ok(ids)
    }

    /// Number of term-infos a boolean candidate matched.
    pub fn bits_on(&self, doc_id: u64) -> Option<usize> {
        self.bits
            .as_ref()?
            .get(&doc_id)
            .map(|bits| bits.iter().filter(|b| *b).count())
    }
}

/// Set the vote of every entry found in `info` to `pass`.
fn add_votes(entries: &mut [Candidate], info: &TermInfo, lists: &[WorkingList], pass: u8) {
    for sub in &info.sublists {
        let mut blocks = positive_blocks(&lists[sub.qterm]).peekable();
        for entry in entries.iter_mut() {
            while blocks.next_if(|b| b.doc_id() < entry.doc_id).is_some() {}
            let Some(block) = blocks.peek() else {
                break;
            };
            if block.doc_id() == entry.doc_id && in_range(info.range, block) {
                entry.vote = pass;
            }
        }
    }
}

/// Mark every entry found in the negative `info` as removed.
fn remove_votes(entries: &mut [Candidate], info: &TermInfo, lists: &[WorkingList]) {
    for sub in &info.sublists {
        let mut blocks = positive_blocks(&lists[sub.qterm]).peekable();
        for entry in entries.iter_mut() {
            while blocks.next_if(|b| b.doc_id() < entry.doc_id).is_some() {}
            match blocks.peek() {
                Some(block) if block.doc_id() == entry.doc_id => entry.vote = VOTE_REMOVED,
                Some(_) => {}
                None => break,
            }
        }
    }
}
