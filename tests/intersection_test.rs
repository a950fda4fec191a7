//! Integration tests for candidate resolution and list compaction

use std::collections::BTreeSet;

use posrank::cli::{Fixture, GenerateParams, random_fixture};
use posrank::lookup::SiteWhitelist;
use posrank::posting::WorkingList;
use posrank::prelude::*;
use posrank::ranking::{CandidateSet, TermGrouping, compact_list, compact_term_lists};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn generated(seed: u64, terms: usize) -> Fixture {
    let params = GenerateParams {
        docs: 300,
        terms,
        density: 0.5,
        max_postings: 4,
        doc_length: 500,
    };
    random_fixture(&params, &mut StdRng::seed_from_u64(seed))
}

fn working_lists(query: &Query) -> Result<Vec<WorkingList>> {
    query
        .terms
        .iter()
        .map(|t| match &t.list {
            Some(list) => WorkingList::from_term_list(list),
            None => Ok(WorkingList::default()),
        })
        .collect()
}

fn docs_of(fixture: &Fixture, term: usize) -> BTreeSet<u64> {
    fixture.terms[term].docs.iter().map(|d| d.doc_id).collect()
}

#[test]
fn test_candidates_are_the_exact_intersection() -> Result<()> {
    for seed in 0..6 {
        let fixture = generated(seed, 3);
        let query = fixture.query()?;
        let lists = working_lists(&query)?;
        let grouping = TermGrouping::build(&query, &lists, 50)?;
        let candidates = CandidateSet::resolve(&query, &grouping, &lists, None)?;

        let mut expected = docs_of(&fixture, 0);
        for t in 1..fixture.terms.len() {
            let other = docs_of(&fixture, t);
            expected.retain(|d| other.contains(d));
        }
        let got: Vec<u64> = candidates.doc_ids().collect();
        let want: Vec<u64> = expected.into_iter().collect();
        assert_eq!(got, want, "seed {seed}");
    }
    Ok(())
}

#[test]
fn test_negative_term_is_subtracted() -> Result<()> {
    let mut fixture = generated(11, 3);
    fixture.terms[2].sign = TermSign::Minus;
    let query = fixture.query()?;
    let lists = working_lists(&query)?;
    let grouping = TermGrouping::build(&query, &lists, 50)?;
    let candidates = CandidateSet::resolve(&query, &grouping, &lists, None)?;

    let excluded = docs_of(&fixture, 2);
    let both: BTreeSet<u64> = docs_of(&fixture, 0)
        .intersection(&docs_of(&fixture, 1))
        .copied()
        .filter(|d| !excluded.contains(d))
        .collect();
    let got: BTreeSet<u64> = candidates.doc_ids().collect();
    assert_eq!(got, both);
    Ok(())
}

#[test]
fn test_whitelist_restricts_candidates() -> Result<()> {
    let fixture = generated(5, 2);
    let query = fixture.query()?;
    let lists = working_lists(&query)?;
    let grouping = TermGrouping::build(&query, &lists, 50)?;
    let whitelist = DocIdSet::new((1..=300).filter(|d| d % 3 == 0));
    let whitelist: &dyn SiteWhitelist = &whitelist;
    let candidates = CandidateSet::resolve(&query, &grouping, &lists, Some(whitelist))?;

    assert!(candidates.doc_ids().all(|d| d % 3 == 0));
    Ok(())
}

#[test]
fn test_boolean_candidates_come_in_descending_order() -> Result<()> {
    let mut fixture = generated(8, 2);
    fixture.expression = Some(BoolExpr::or(vec![BoolExpr::term(0), BoolExpr::term(1)]));
    let query = fixture.query()?;
    let lists = working_lists(&query)?;
    let grouping = TermGrouping::build(&query, &lists, 50)?;
    let candidates = CandidateSet::resolve(&query, &grouping, &lists, None)?;

    let ids: Vec<u64> = candidates.doc_ids().collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]));

    let union: BTreeSet<u64> = docs_of(&fixture, 0)
        .union(&docs_of(&fixture, 1))
        .copied()
        .collect();
    assert_eq!(ids.iter().copied().collect::<BTreeSet<_>>(), union);

    let ascending = candidates.ascending_ids()?;
    assert!(ascending.windows(2).all(|w| w[0] < w[1]));
    for &doc in &ascending {
        let expected = usize::from(docs_of(&fixture, 0).contains(&doc))
            + usize::from(docs_of(&fixture, 1).contains(&doc));
        assert_eq!(candidates.bits_on(doc), Some(expected));
    }
    Ok(())
}

#[test]
fn test_compaction_is_idempotent() -> Result<()> {
    let fixture = generated(21, 3);
    let query = fixture.query()?;
    let mut lists = working_lists(&query)?;
    let grouping = TermGrouping::build(&query, &lists, 50)?;
    let candidates = CandidateSet::resolve(&query, &grouping, &lists, None)?;
    let ids = candidates.ascending_ids()?;

    let matching = compact_term_lists(&grouping, &ids, &mut lists)?;
    assert_eq!(matching.len(), grouping.len());
    for list in &lists {
        assert_eq!(list.num_docs(), ids.len());
        let again = compact_list(list, &ids)?;
        assert_eq!(&again, list);
    }
    Ok(())
}

#[test]
fn test_compaction_drops_delete_markers() -> Result<()> {
    let mut builder = TermListBuilder::new(1);
    builder.add_doc(1, 0, 0, &[PostingFields::body(1)])?;
    builder.add_deleted_doc(2, 0, 0, &[PostingFields::body(1)])?;
    builder.add_doc(3, 0, 0, &[PostingFields::body(1), PostingFields::body(5)])?;
    let list = WorkingList::from_term_list(&builder.build())?;

    let compacted = compact_list(&list, &[1, 2, 3])?;
    let ids: Vec<u64> = compacted.blocks().map(|b| b.doc_id()).collect();
    assert_eq!(ids, vec![1, 3]);
    Ok(())
}
