//! End-to-end ranking scenarios through the public engine API

use std::sync::Arc;

use posrank::lookup::SiteFlagTable;
use posrank::posting::NumericValue;
use posrank::prelude::*;

fn term(text: &str, id: u64, qpos: i32, docs: &[(u64, u8, &[u32])]) -> Result<QueryTerm> {
    let mut builder = TermListBuilder::new(id);
    for &(doc, lang, positions) in docs {
        let postings: Vec<PostingFields> = positions.iter().map(|&p| PostingFields::body(p)).collect();
        builder.add_doc(doc, 0, lang, &postings)?;
    }
    Ok(QueryTerm::new(text, id).with_list(builder.build()).with_qpos(qpos))
}

fn numeric_term(text: &str, id: u64, field: FieldCode, values: &[(u64, f32)]) -> Result<QueryTerm> {
    let mut builder = TermListBuilder::new(id);
    for &(doc, v) in values {
        builder.add_numeric_doc(doc, 0, 0, &[NumericValue::Float(v)])?;
    }
    Ok(QueryTerm::new(text, id).with_list(builder.build()).with_field(field))
}

fn engine() -> RankingEngine {
    RankingEngine::new(Arc::new(ScoringWeights::default()))
}

fn rank(query: &Query, request: &RankingRequest) -> Result<(Vec<TopNode>, RankingStats)> {
    let ctx = RankingContext::new(&AllDocuments);
    let mut tree = BoundedTopTree::new(request.docs_to_get);
    let stats = engine().rank(query, request, &ctx, &mut tree, None)?;
    Ok((tree.nodes(), stats))
}

fn ids(nodes: &[TopNode]) -> Vec<u64> {
    nodes.iter().map(|n| n.doc_id).collect()
}

#[test]
fn test_adjacent_terms_score_full_pair_weight() -> Result<()> {
    let query = Query::new(vec![
        term("new", 1, 0, &[(1, 0, &[10]), (2, 0, &[10])])?,
        term("york", 2, 2, &[(1, 0, &[12]), (2, 0, &[300])])?,
    ]);
    let (nodes, stats) = rank(&query, &RankingRequest::new(10))?;

    assert_eq!(stats.candidates, 2);
    assert_eq!(ids(&nodes), vec![1, 2]);
    // Body postings with the best ranks at the query distance.
    assert!((nodes[0].score - 100.0).abs() < 1e-3);
    assert!(nodes[1].score < 1.0);
    Ok(())
}

#[test]
fn test_negated_term_removes_documents() -> Result<()> {
    let query = Query::new(vec![
        term("jaguar", 1, 0, &[(1, 0, &[3]), (2, 0, &[3]), (3, 0, &[3])])?,
        term("car", 2, 2, &[(2, 0, &[9])])?.with_sign(TermSign::Minus),
    ]);
    let (nodes, stats) = rank(&query, &RankingRequest::new(10))?;

    assert_eq!(stats.candidates, 2);
    assert_eq!(ids(&nodes), vec![1, 3]);
    Ok(())
}

#[test]
fn test_float_sort_by_replaces_score() -> Result<()> {
    let docs: &[(u64, u8, &[u32])] = &[(1, 0, &[1]), (2, 0, &[1]), (3, 0, &[1])];
    let values = [(1, 1.5), (2, 3.5), (3, 2.5)];

    let query = Query::new(vec![
        term("shoes", 1, 0, docs)?,
        numeric_term("gbsortby:price", 2, FieldCode::SortByFloat, &values)?,
    ]);
    let (nodes, _) = rank(&query, &RankingRequest::new(10))?;
    assert_eq!(ids(&nodes), vec![2, 3, 1]);
    assert_eq!(nodes[0].score, 3.5);

    let query = Query::new(vec![
        term("shoes", 1, 0, docs)?,
        numeric_term("gbrevsortby:price", 2, FieldCode::RevSortByFloat, &values)?,
    ]);
    let (nodes, _) = rank(&query, &RankingRequest::new(10))?;
    assert_eq!(ids(&nodes), vec![1, 3, 2]);
    assert_eq!(nodes[0].score, -1.5);
    Ok(())
}

#[test]
fn test_number_range_filters_candidates() -> Result<()> {
    let docs: &[(u64, u8, &[u32])] = &[(1, 0, &[1]), (2, 0, &[1]), (3, 0, &[1])];
    let query = Query::new(vec![
        term("tv", 1, 0, docs)?,
        numeric_term(
            "gbmin:size",
            2,
            FieldCode::NumberMin(40.0),
            &[(1, 32.0), (2, 55.0), (3, 40.0)],
        )?,
    ]);
    let (nodes, stats) = rank(&query, &RankingRequest::new(10))?;
    assert_eq!(stats.candidates, 2);
    let mut got = ids(&nodes);
    got.sort_unstable();
    assert_eq!(got, vec![2, 3]);
    Ok(())
}

#[test]
fn test_query_language_boosts_matching_documents() -> Result<()> {
    let query = Query::new(vec![term(
        "hola",
        1,
        0,
        &[(1, 2, &[5]), (2, 0, &[5]), (3, 1, &[5])],
    )?]);
    let request = RankingRequest::new(10).with_language(1);
    let (nodes, _) = rank(&query, &request)?;

    assert_eq!(ids(&nodes), vec![3, 2, 1]);
    let base = nodes[2].score;
    assert!((nodes[0].score / base - request.same_lang_weight).abs() < 1e-3);
    assert!((nodes[1].score / base - request.unknown_lang_weight).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_serp_cursor_pages_through_results() -> Result<()> {
    let docs: Vec<(u64, u8, Vec<u32>)> = (1..=6).map(|d| (d, 0, vec![1, 2 + d as u32 * 40])).collect();
    let a: Vec<(u64, u8, &[u32])> = docs.iter().map(|(d, l, p)| (*d, *l, &p[..1])).collect();
    let b: Vec<(u64, u8, &[u32])> = docs.iter().map(|(d, l, p)| (*d, *l, &p[1..])).collect();
    let query = Query::new(vec![term("a", 1, 0, &a)?, term("b", 2, 2, &b)?]);

    let (page1, _) = rank(&query, &RankingRequest::new(3))?;
    assert_eq!(page1.len(), 3);
    let last = page1[2];

    let mut request = RankingRequest::new(3);
    request.max_serp_score = Some(f64::from(last.score));
    request.min_serp_doc_id = Some(last.doc_id);
    let (page2, stats) = rank(&query, &request)?;

    assert_eq!(page2.len(), 3);
    assert_eq!(stats.filtered, 3);
    for node in &page2 {
        assert!(!ids(&page1).contains(&node.doc_id));
        assert!(node.score <= last.score);
    }
    Ok(())
}

#[test]
fn test_explain_matches_tree_scores() -> Result<()> {
    let query = Query::new(vec![
        term("deep", 1, 0, &[(1, 0, &[4, 90]), (2, 0, &[7]), (3, 0, &[1])])?,
        term("sea", 2, 2, &[(1, 0, &[6]), (2, 0, &[60]), (3, 0, &[500])])?,
    ]);
    let request = RankingRequest::new(2).with_scoring_info(true);
    let mut flags = SiteFlagTable::new();
    flags.insert(2, 0b10);
    let ctx = RankingContext::new(&AllDocuments).with_site_flags(&flags);
    let mut tree = BoundedTopTree::new(2);
    let mut explain = ExplainBuffer::new(2);
    let stats = engine().rank(&query, &request, &ctx, &mut tree, Some(&mut explain))?;

    assert_eq!(stats.explained, 2);
    assert_eq!(explain.len(), 2);
    for node in tree.nodes() {
        let doc = explain.get(node.doc_id).expect("retained doc is explained");
        assert!((doc.final_score - node.score).abs() < 1e-4);
        assert_eq!(doc.flags, node.flags);
        assert!(!explain.singles_of(doc).is_empty());
        assert!(!explain.pairs_of(doc).is_empty());
    }
    assert!(explain.get(3).is_none());
    Ok(())
}

#[test]
fn test_boolean_query_ranks_by_matched_terms() -> Result<()> {
    let query = Query::boolean(
        vec![
            term("cats", 1, 0, &[(1, 0, &[1]), (2, 0, &[1])])?,
            term("dogs", 2, 2, &[(2, 0, &[9]), (3, 0, &[9])])?,
            term("fish", 3, 4, &[(3, 0, &[4])])?,
        ],
        BoolExpr::and(vec![
            BoolExpr::or(vec![BoolExpr::term(0), BoolExpr::term(1)]),
            BoolExpr::not(BoolExpr::term(2)),
        ]),
    );
    let (nodes, _) = rank(&query, &RankingRequest::new(10))?;

    assert_eq!(ids(&nodes), vec![2, 1]);
    assert_eq!(nodes[0].score, 2.0);
    assert_eq!(nodes[1].score, 1.0);
    Ok(())
}

#[test]
fn test_synonym_and_bigram_sublists_match_for_their_term() -> Result<()> {
    // 0: "car", 1: "insurance", 2: "auto" synonym of car, 3: "car insurance".
    let mut terms = vec![
        term("car", 1, 0, &[(1, 0, &[10]), (3, 0, &[40])])?,
        term("insurance", 2, 2, &[(1, 0, &[12]), (2, 0, &[12]), (3, 0, &[90])])?,
        term("auto", 3, 0, &[(2, 0, &[10])])?.as_synonym_of(0),
        term("car insurance", 4, 0, &[(4, 0, &[10])])?.as_bigram(false),
    ];
    terms[0].right_phrase_term = Some(3);
    terms[1].left_phrase_term = Some(3);
    let query = Query::new(terms);
    let (nodes, stats) = rank(&query, &RankingRequest::new(10))?;

    // Doc 2 has "car" only through its synonym, doc 4 both words only
    // through the bigram.
    assert_eq!(stats.candidates, 4);
    assert_eq!(nodes[0].doc_id, 1);
    assert!((nodes[0].score - 100.0).abs() < 1e-3);
    let mut rest: Vec<u64> = ids(&nodes[1..3]);
    rest.sort_unstable();
    assert_eq!(rest, vec![2, 4]);
    for node in &nodes[1..3] {
        assert!(node.score > 0.0 && node.score < nodes[0].score);
    }
    // Far-apart original words lose to the adjacent synonym match.
    assert_eq!(nodes[3].doc_id, 3);
    Ok(())
}
