//! Grouping of query terms into term-infos.
//!
//! Every required query term becomes one [`TermInfo`] that bundles the
//! term's own list with its bigram and synonym lists. A document matches
//! the term-info when it appears in any of these sublists.

use bitflags::bitflags;
use log::{debug, warn};

use crate::error::{RankError, Result};
use crate::posting::WorkingList;
use crate::query::{FieldCode, Query, QueryTerm, RangeFilter};

bitflags! {
    /// Role of a sublist inside its term-info.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SublistFlags: u8 {
        const HALF_STOP_WIKI_BIGRAM = 0x01;
        const PIPED = 0x02;
        const SYNONYM = 0x04;
        const NEGATIVE = 0x08;
        const BIGRAM = 0x10;
        const NUMBER = 0x20;
    }
}

impl SublistFlags {
    /// Flags of term-infos that take no part in proximity scoring.
    pub const UNSCORED: SublistFlags = SublistFlags::PIPED
        .union(SublistFlags::NEGATIVE)
        .union(SublistFlags::NUMBER);

    pub fn is_scored(self) -> bool {
        !self.intersects(Self::UNSCORED)
    }
}

/// One physical list of a term-info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubList {
    /// Query term that owns the list.
    pub qterm: usize,
    pub flags: SublistFlags,
}

/// A required query term with all lists that can satisfy it.
#[derive(Debug, Clone)]
pub struct TermInfo {
    /// The query term this info was built for.
    pub qterm: usize,
    /// Non-empty sublists in precedence order.
    pub sublists: Vec<SubList>,
    /// Flags of the first sublist, or of the term's own list when every
    /// list is empty.
    pub flags: SublistFlags,
    pub qpos: i32,
    pub wiki_phrase_id: i32,
    pub quoted_start: Option<usize>,
    pub freq_weight: f32,
    /// Sum of the sublist sizes in bytes.
    pub total_size: usize,
    /// Value filter of a range term.
    pub range: Option<RangeFilter>,
}

impl TermInfo {
    pub fn is_negative(&self) -> bool {
        self.flags.contains(SublistFlags::NEGATIVE)
    }

    pub fn is_number(&self) -> bool {
        self.flags.contains(SublistFlags::NUMBER)
    }

    /// Whether the info takes part in single-term and pair scoring.
    pub fn is_scored(&self) -> bool {
        self.flags.is_scored()
    }
}

/// The numeric term whose value replaces the relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBy {
    /// Index of the term-info.
    pub info: usize,
    pub int: bool,
    pub reverse: bool,
}

/// All term-infos of a query.
#[derive(Debug, Clone, Default)]
pub struct TermGrouping {
    pub infos: Vec<TermInfo>,
    /// Non-negative info with the smallest total size.
    pub pivot: Option<usize>,
    /// Info ordinal each query term was assigned to.
    pub bit_of_term: Vec<Option<usize>>,
    pub sort_by: Option<SortBy>,
    /// Every plain positive term shares the first wiki phrase.
    pub all_in_same_wiki_phrase: bool,
}

struct InfoBuilder<'a> {
    lists: &'a [WorkingList],
    bit_of_term: &'a mut [Option<usize>],
    ordinal: usize,
    piped: bool,
    sublists: Vec<SubList>,
    own_flags: SublistFlags,
}

impl InfoBuilder<'_> {
    fn push(&mut self, qterm: usize, flags: SublistFlags) {
        let flags = if self.piped {
            flags | SublistFlags::PIPED
        } else {
            flags
        };
        self.bit_of_term[qterm] = Some(self.ordinal);
        if self.lists.get(qterm).is_some_and(|l| !l.is_empty()) {
            self.sublists.push(SubList { qterm, flags });
        }
    }

    /// A bigram list followed by the synonyms of the bigram.
    fn push_with_synonyms(
        &mut self,
        terms: &[QueryTerm],
        bigram: usize,
        flags: SublistFlags,
        synonym_flags: SublistFlags,
    ) {
        self.push(bigram, flags);
        for (k, term) in terms.iter().enumerate() {
            if term.synonym_of == Some(bigram) {
                self.push(k, synonym_flags);
            }
        }
    }
}

fn own_list_flags(term: &QueryTerm) -> SublistFlags {
    let mut flags = SublistFlags::empty();
    if term.is_negative() {
        flags |= SublistFlags::NEGATIVE;
    }
    if term.field.is_numeric() {
        flags |= SublistFlags::NUMBER;
    }
    flags
}

impl TermGrouping {
    /// Group the required terms of `query`. `lists` holds the working list
    /// of every query term, empty for terms without postings.
    pub fn build(query: &Query, lists: &[WorkingList], max_sublists: usize) -> Result<Self> {
        let terms = &query.terms;
        let mut bit_of_term = vec![None; terms.len()];
        let mut infos = Vec::new();
        let mut sort_by = None;

        for (i, term) in terms.iter().enumerate() {
            if !term.required {
                continue;
            }
            let ordinal = infos.len();

            if term.field.is_sort_by_float() || term.field.is_sort_by_int() {
                if sort_by.is_none() {
                    sort_by = Some(SortBy {
                        info: ordinal,
                        int: term.field.is_sort_by_int(),
                        reverse: term.field.is_reverse_sort(),
                    });
                } else {
                    warn!("ignoring extra sort-by term {:?}", term.text);
                }
            }

            let mut builder = InfoBuilder {
                lists,
                bit_of_term: &mut bit_of_term,
                ordinal,
                piped: term.piped,
                sublists: Vec::new(),
                own_flags: own_list_flags(term),
            };

            if term.is_negative() {
                let flags = builder.own_flags;
                builder.push(i, flags);
            } else {
                let left = term.left_phrase_term;
                let right = term.right_phrase_term;
                let half_stop = |idx: Option<usize>| {
                    idx.filter(|&b| terms[b].wiki_half_stop_bigram)
                };
                let left_half_stop = half_stop(left);
                let right_half_stop = half_stop(right);

                for bigram in [left_half_stop, right_half_stop].into_iter().flatten() {
                    builder.push_with_synonyms(
                        terms,
                        bigram,
                        SublistFlags::HALF_STOP_WIKI_BIGRAM,
                        SublistFlags::HALF_STOP_WIKI_BIGRAM | SublistFlags::SYNONYM,
                    );
                }

                let flags = builder.own_flags;
                builder.push(i, flags);

                for (bigram, already) in [(left, left_half_stop), (right, right_half_stop)] {
                    if let (Some(bigram), None) = (bigram, already) {
                        builder.push_with_synonyms(
                            terms,
                            bigram,
                            SublistFlags::BIGRAM,
                            SublistFlags::SYNONYM,
                        );
                    }
                }

                for (k, other) in terms.iter().enumerate() {
                    if other.synonym_of == Some(i) {
                        builder.push(k, SublistFlags::SYNONYM);
                    }
                }
            }

            let InfoBuilder {
                sublists,
                own_flags,
                ..
            } = builder;

            if sublists.len() >= max_sublists {
                return Err(RankError::QueryTooBig {
                    term: i,
                    sublists: sublists.len(),
                    limit: max_sublists,
                });
            }

            let total_size = sublists.iter().map(|s| lists[s.qterm].len()).sum();
            let flags = sublists.first().map_or(own_flags, |s| s.flags);
            let range = match term.field {
                FieldCode::Text => None,
                field => field.range(),
            };
            infos.push(TermInfo {
                qterm: i,
                sublists,
                flags,
                qpos: term.qpos,
                wiki_phrase_id: term.wiki_phrase_id,
                quoted_start: term.quoted_start,
                freq_weight: term.freq_weight,
                total_size,
                range,
            });
        }

        let mut pivot: Option<usize> = None;
        for (i, info) in infos.iter().enumerate() {
            if info.is_negative() {
                continue;
            }
            if pivot.is_none_or(|p| info.total_size < infos[p].total_size) {
                pivot = Some(i);
            }
        }

        let all_in_same_wiki_phrase = infos
            .iter()
            .filter(|info| !info.is_negative() && !info.is_number())
            .all(|info| info.wiki_phrase_id == 1);

        for (n, info) in infos.iter().enumerate() {
            debug!(
                "term-info #{n}: qterm={} sublists={} bytes={} flags={:?}",
                info.qterm,
                info.sublists.len(),
                info.total_size,
                info.flags
            );
        }

        Ok(Self {
            infos,
            pivot,
            bit_of_term,
            sort_by,
            all_in_same_wiki_phrase,
        })
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Indices of the non-negative term-infos.
    pub fn positive(&self) -> impl Iterator<Item = usize> + '_ {
        self.infos
            .iter()
            .enumerate()
            .filter(|(_, info)| !info.is_negative())
            .map(|(i, _)| i)
    }

    /// Size in bytes of the pivot's sublists.
    pub fn pivot_size(&self) -> usize {
        self.pivot.map_or(0, |p| self.infos[p].total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{PostingFields, TermListBuilder};
    use crate::query::TermSign;

    fn list(term_id: u64, docs: &[u64]) -> WorkingList {
        let mut builder = TermListBuilder::new(term_id);
        for &doc in docs {
            builder
                .add_doc(doc, 0, 0, &[PostingFields::body(1)])
                .unwrap();
        }
        WorkingList::from_term_list(&builder.build()).unwrap()
    }

    #[test]
    fn test_sublist_precedence() {
        // 0: "new", 1: "york", 2: "new york" (plain bigram), 3: "nyc" synonym of 1,
        // 4: "the new" half-stop wiki bigram
        let terms = vec![
            QueryTerm::new("new", 1),
            QueryTerm::new("york", 2),
            QueryTerm::new("new york", 3).as_bigram(false),
            QueryTerm::new("nyc", 4).as_synonym_of(1),
            QueryTerm::new("the new", 5).as_bigram(true),
        ];
        let mut terms = terms;
        terms[0].left_phrase_term = Some(4);
        terms[0].right_phrase_term = Some(2);
        terms[1].left_phrase_term = Some(2);

        let lists = vec![
            list(1, &[1, 2, 3]),
            list(2, &[2]),
            list(3, &[2]),
            list(4, &[5]),
            list(5, &[1]),
        ];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        assert_eq!(grouping.len(), 2);

        let first = &grouping.infos[0];
        let order: Vec<(usize, SublistFlags)> =
            first.sublists.iter().map(|s| (s.qterm, s.flags)).collect();
        assert_eq!(
            order,
            vec![
                (4, SublistFlags::HALF_STOP_WIKI_BIGRAM),
                (0, SublistFlags::empty()),
                (2, SublistFlags::BIGRAM),
            ]
        );
        assert_eq!(first.flags, SublistFlags::HALF_STOP_WIKI_BIGRAM);

        let second = &grouping.infos[1];
        let order: Vec<usize> = second.sublists.iter().map(|s| s.qterm).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(second.sublists[2].flags, SublistFlags::SYNONYM);

        // "york" plus its bigram and synonym is the smaller group.
        assert_eq!(grouping.pivot, Some(1));
        assert_eq!(grouping.bit_of_term[3], Some(1));
        assert_eq!(grouping.bit_of_term[4], Some(0));
    }

    #[test]
    fn test_negative_term_only_own_list() {
        let mut terms = vec![
            QueryTerm::new("a", 1),
            QueryTerm::new("c", 2).with_sign(TermSign::Minus),
            QueryTerm::new("cs", 3).as_synonym_of(1),
        ];
        terms[1].right_phrase_term = None;
        let lists = vec![list(1, &[1]), list(2, &[1]), list(3, &[4])];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        let neg = &grouping.infos[1];
        assert!(neg.is_negative());
        assert_eq!(neg.sublists.len(), 1);
        assert_eq!(grouping.pivot, Some(0));
        assert!(!neg.is_scored());
    }

    #[test]
    fn test_empty_lists_are_skipped() {
        let terms = vec![QueryTerm::new("a", 1), QueryTerm::new("b", 2)];
        let lists = vec![list(1, &[1]), WorkingList::default()];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        assert!(grouping.infos[1].sublists.is_empty());
        assert_eq!(grouping.pivot, Some(1));
        assert_eq!(grouping.pivot_size(), 0);
    }

    #[test]
    fn test_too_many_sublists() {
        let mut terms = vec![QueryTerm::new("a", 1)];
        let mut lists = vec![list(1, &[1])];
        for k in 0..4 {
            terms.push(QueryTerm::new(format!("syn{k}"), 10 + k).as_synonym_of(0));
            lists.push(list(10 + k, &[1]));
        }
        let err = TermGrouping::build(&Query::new(terms), &lists, 5).unwrap_err();
        assert!(matches!(err, RankError::QueryTooBig { sublists: 5, limit: 5, .. }));
    }

    #[test]
    fn test_only_first_sort_by_is_honored() {
        let terms = vec![
            QueryTerm::new("a", 1),
            QueryTerm::new("price", 2).with_field(FieldCode::RevSortByFloat),
            QueryTerm::new("size", 3).with_field(FieldCode::SortByInt),
        ];
        let lists = vec![list(1, &[1]), list(2, &[1]), list(3, &[1])];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        assert_eq!(
            grouping.sort_by,
            Some(SortBy {
                info: 1,
                int: false,
                reverse: true
            })
        );
        assert!(grouping.infos[2].is_number());
    }

    #[test]
    fn test_piped_flag_on_every_sublist() {
        let terms = vec![
            QueryTerm::new("a", 1).with_piped(true),
            QueryTerm::new("as", 2).as_synonym_of(0),
        ];
        let lists = vec![list(1, &[1]), list(2, &[1])];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        assert!(grouping.infos[0]
            .sublists
            .iter()
            .all(|s| s.flags.contains(SublistFlags::PIPED)));
    }

    #[test]
    fn test_all_in_same_wiki_phrase() {
        let terms = vec![
            QueryTerm::new("a", 1).with_wiki_phrase_id(1),
            QueryTerm::new("b", 2).with_wiki_phrase_id(1),
        ];
        let lists = vec![list(1, &[1]), list(2, &[1])];
        let grouping = TermGrouping::build(&Query::new(terms), &lists, 50).unwrap();
        assert!(grouping.all_in_same_wiki_phrase);
    }
}
