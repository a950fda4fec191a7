//! Criterion benchmarks for the ranking core.
//!
//! Fixtures are generated with a fixed seed so runs are comparable:
//! - termlist decoding into working lists
//! - full evaluations with and without score bound pruning
//! - the explain pass

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use posrank::cli::{Fixture, GenerateParams, random_fixture};
use posrank::posting::WorkingList;
use posrank::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn fixture(docs: usize, terms: usize) -> Fixture {
    let params = GenerateParams {
        docs,
        terms,
        density: 0.4,
        max_postings: 6,
        doc_length: 1500,
    };
    random_fixture(&params, &mut StdRng::seed_from_u64(17))
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let query = fixture(10_000, 1).query().unwrap();
    let list = query.terms[0].list.clone().unwrap();

    group.throughput(Throughput::Bytes(list.len() as u64));
    group.bench_function("working_list_from_term_list", |b| {
        b.iter(|| black_box(WorkingList::from_term_list(black_box(&list)).unwrap()))
    });
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    group.sample_size(20);

    let engine = RankingEngine::new(Arc::new(ScoringWeights::default()));
    for terms in [2, 4] {
        let fx = fixture(5_000, terms);
        let query = fx.query().unwrap();
        let lookups = fx.lookups();

        for prune in [true, false] {
            let request = RankingRequest::new(10).with_max_score_algo(prune);
            let name = format!("{terms}_terms_{}", if prune { "pruned" } else { "exhaustive" });
            group.throughput(Throughput::Elements(5_000));
            group.bench_function(name, |b| {
                b.iter(|| {
                    let mut tree = BoundedTopTree::new(10);
                    let stats = engine
                        .rank(&query, &request, &lookups.context(), &mut tree, None)
                        .unwrap();
                    black_box((stats, tree.nodes()))
                })
            });
        }
    }
    group.finish();
}

fn bench_explain(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain");
    group.sample_size(20);

    let engine = RankingEngine::new(Arc::new(ScoringWeights::default()));
    let fx = fixture(2_000, 3);
    let query = fx.query().unwrap();
    let lookups = fx.lookups();
    let request = RankingRequest::new(50).with_scoring_info(true);

    group.bench_function("rank_with_scoring_info", |b| {
        b.iter(|| {
            let mut tree = BoundedTopTree::new(50);
            let mut explain = ExplainBuffer::new(50);
            engine
                .rank(
                    &query,
                    &request,
                    &lookups.context(),
                    &mut tree,
                    Some(&mut explain),
                )
                .unwrap();
            black_box(explain.len())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_rank, bench_explain);
criterion_main!(benches);
