//! Sublist compaction.
//!
//! Once the candidate set is final, every list that can still contribute
//! postings is shrunk to the candidate documents. Scoring then walks lists
//! that hold nothing but matches.

use log::debug;

use crate::error::Result;
use crate::posting::WorkingList;
use crate::ranking::term_info::{SublistFlags, TermGrouping};

/// A non-empty compacted sublist of a term-info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingSubList {
    pub qterm: usize,
    pub flags: SublistFlags,
}

/// Keep the blocks of `list` whose document is in `doc_ids` (ascending).
///
/// Delete-marker blocks are dropped. Running it twice with the same ids
/// changes nothing.
pub fn compact_list(list: &WorkingList, doc_ids: &[u64]) -> Result<WorkingList> {
    let mut bytes = Vec::new();
    bytes.try_reserve(list.len().min(doc_ids.len().saturating_mul(64)))?;
    let mut num_docs = 0;
    let mut ids = doc_ids.iter().copied().peekable();

    for block in list.blocks() {
        while ids.next_if(|&id| id < block.doc_id()).is_some() {}
        let Some(&next) = ids.peek() else {
            break;
        };
        if next == block.doc_id() && !block.is_delete_marker() {
            bytes.try_reserve(block.len())?;
            bytes.extend_from_slice(block.as_bytes());
            num_docs += 1;
        }
    }
    Ok(WorkingList::from_validated(bytes, num_docs))
}

/// Compact every list referenced by a non-negative term-info and return,
/// per term-info, its non-empty matching sublists.
///
/// Lists shared by several term-infos are compacted once.
pub fn compact_term_lists(
    grouping: &TermGrouping,
    doc_ids: &[u64],
    lists: &mut [WorkingList],
) -> Result<Vec<Vec<MatchingSubList>>> {
    let mut done = vec![false; lists.len()];
    for info in grouping.infos.iter().filter(|info| !info.is_negative()) {
        for sub in &info.sublists {
            if done[sub.qterm] {
                continue;
            }
            let before = lists[sub.qterm].len();
            lists[sub.qterm] = compact_list(&lists[sub.qterm], doc_ids)?;
            done[sub.qterm] = true;
            debug!(
                "compacted list of qterm {}: {} -> {} bytes",
                sub.qterm,
                before,
                lists[sub.qterm].len()
            );
        }
    }

    Ok(grouping
        .infos
        .iter()
        .map(|info| {
            if info.is_negative() {
                return Vec::new();
            }
            info.sublists
                .iter()
                .filter(|sub| !lists[sub.qterm].is_empty())
                .map(|sub| MatchingSubList {
                    qterm: sub.qterm,
                    flags: sub.flags,
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{PostingFields, TermListBuilder};
    use crate::query::{Query, QueryTerm};

    fn list(term_id: u64, docs: &[u64]) -> WorkingList {
        let mut builder = TermListBuilder::new(term_id);
        for &doc in docs {
            builder
                .add_doc(
                    doc,
                    3,
                    1,
                    &[PostingFields::body(doc as u32), PostingFields::body(doc as u32 + 7)],
                )
                .unwrap();
        }
        WorkingList::from_term_list(&builder.build()).unwrap()
    }

    fn doc_ids(list: &WorkingList) -> Vec<u64> {
        list.blocks().map(|b| b.doc_id()).collect()
    }

    #[test]
    fn test_compact_keeps_candidates() {
        let original = list(1, &[1, 2, 3, 4, 5, 6]);
        let compacted = compact_list(&original, &[2, 5, 9]).unwrap();
        assert_eq!(doc_ids(&compacted), vec![2, 5]);
        assert_eq!(compacted.num_docs(), 2);
        let keys: Vec<u32> = compacted
            .blocks()
            .flat_map(|b| b.keys().map(|k| k.word_pos()).collect::<Vec<_>>())
            .collect();
        assert_eq!(keys, vec![2, 9, 5, 12]);
    }

    #[test]
    fn test_compact_is_idempotent() {
        let original = list(1, &[1, 3, 5, 7]);
        let ids = [3, 7];
        let once = compact_list(&original, &ids).unwrap();
        let twice = compact_list(&once, &ids).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_compact_drops_delete_markers() {
        let mut builder = TermListBuilder::new(1);
        builder.add_doc(1, 0, 0, &[PostingFields::body(1)]).unwrap();
        builder.add_deleted_doc(2, 0, 0, &[PostingFields::body(1)]).unwrap();
        let list = WorkingList::from_term_list(&builder.build()).unwrap();
        let compacted = compact_list(&list, &[1, 2]).unwrap();
        assert_eq!(doc_ids(&compacted), vec![1]);
    }

    #[test]
    fn test_matching_sublists_skip_empty() {
        let query = Query::new(vec![
            QueryTerm::new("a", 1),
            QueryTerm::new("as", 2).as_synonym_of(0),
        ]);
        let mut lists = vec![list(1, &[1, 2]), list(2, &[3])];
        let grouping = TermGrouping::build(&query, &lists, 50).unwrap();
        let matching = compact_term_lists(&grouping, &[1], &mut lists).unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].len(), 1);
        assert_eq!(matching[0][0].qterm, 0);
        assert!(lists[1].is_empty());
    }
}
