//! Command implementations for the posrank CLI.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cli::args::*;
use crate::cli::fixture::{Fixture, GenerateParams, random_fixture};
use crate::cli::output::*;
use crate::config::RankingConfig;
use crate::posting::{DocHeader, NumericValue, PostingKey};
use crate::query::FieldCode;
use crate::ranking::{ExplainBuffer, RankingEngine};
use crate::top_tree::{BoundedTopTree, TopTree};
use crate::weights::{ScoringWeights, WeightRegistry};

/// Execute a CLI command.
pub fn execute_command(args: PosrankArgs) -> Result<()> {
    match &args.command {
        Command::Rank(rank_args) => rank_fixture(rank_args.clone(), &args),
        Command::Inspect(inspect_args) => inspect_term(inspect_args.clone(), &args),
        Command::Config(config_args) => show_config(config_args.clone(), &args),
        Command::Generate(generate_args) => generate_fixture(generate_args.clone(), &args),
    }
}

fn load_fixture(path: &std::path::Path) -> Result<Fixture> {
    Fixture::from_json_file(path)
        .with_context(|| format!("failed to load fixture {}", path.display()))
}

/// Rank the documents of a fixture.
fn rank_fixture(args: RankArgs, cli_args: &PosrankArgs) -> Result<()> {
    let fixture = load_fixture(&args.fixture)?;
    let config = match &args.config {
        Some(path) => RankingConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => fixture.ranking_config(),
    };

    let mut request = fixture.request.clone();
    if let Some(top) = args.top {
        request.docs_to_get = top;
    }
    if args.explain {
        request.get_doc_id_scoring_info = true;
    }
    if args.no_prune {
        request.do_max_score_algo = false;
    }
    if let Some(language) = args.language {
        request.language = language;
    }

    let query = fixture.query().context("invalid fixture query")?;
    let lookups = fixture.lookups();
    let registry = WeightRegistry::new(&config).context("invalid scoring config")?;
    let engine = RankingEngine::from_registry(&registry);
    let mut tree = BoundedTopTree::new(request.docs_to_get);
    let mut explain = ExplainBuffer::new(request.docs_to_get);

    info!(
        "ranking {} terms from {}",
        query.num_terms(),
        args.fixture.display()
    );
    let start = Instant::now();
    let stats = engine.rank(
        &query,
        &request,
        &lookups.context(),
        &mut tree,
        Some(&mut explain),
    )?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let by_int = tree.use_int_scores();
    let results: Vec<RankedDoc> = tree
        .nodes()
        .into_iter()
        .enumerate()
        .map(|(i, node)| RankedDoc {
            rank: i + 1,
            doc_id: node.doc_id,
            score: node.score,
            int_score: by_int.then_some(node.int_score),
            flags: node.flags,
        })
        .collect();

    let mut explanations: Vec<_> = explain.explanations().collect();
    explanations.sort_by_key(|e| {
        results
            .iter()
            .position(|r| r.doc_id == e.doc.doc_id)
            .unwrap_or(usize::MAX)
    });

    output_result(
        "Ranking completed",
        &RankResults {
            num_terms: query.num_terms(),
            results,
            stats,
            duration_ms,
            explanations,
        },
        cli_args,
    )?;

    Ok(())
}

fn is_int_field(field: &FieldCode) -> bool {
    matches!(
        field,
        FieldCode::SortByInt
            | FieldCode::RevSortByInt
            | FieldCode::NumberMinInt(_)
            | FieldCode::NumberMaxInt(_)
            | FieldCode::NumberEqualInt(_)
    )
}

/// Decode every record of one term's list.
fn inspect_term(args: InspectArgs, cli_args: &PosrankArgs) -> Result<()> {
    let fixture = load_fixture(&args.fixture)?;
    let query = fixture.query().context("invalid fixture query")?;
    let term = query.terms.get(args.term).ok_or_else(|| {
        anyhow!(
            "term {} out of range, the fixture has {} terms",
            args.term,
            query.num_terms()
        )
    })?;

    let bytes = term.list.as_ref().map_or(&[][..], |l| l.as_bytes());
    let mut records = Vec::new();
    let mut header = DocHeader::default();
    let mut num_docs = 0;
    let mut offset = 0;
    while offset < bytes.len() {
        let Some(key) = PostingKey::parse(&bytes[offset..]) else {
            bail!("corrupt record at byte {offset} of term {}", args.term);
        };
        if let Some(h) = key.doc_header() {
            header = h;
            num_docs += 1;
        }
        let (posting, value) = if !term.field.is_numeric() {
            (Some(key.fields()), None)
        } else if is_int_field(&term.field) {
            (None, Some(NumericValue::Int(key.int_value())))
        } else {
            (None, Some(NumericValue::Float(key.float_value())))
        };
        records.push(RecordInfo {
            offset,
            width: key.len(),
            doc_id: header.doc_id,
            site_rank: header.site_rank,
            lang: header.lang_id,
            delete_marker: key.is_delete_marker(),
            posting,
            value,
        });
        offset += key.len();
    }
    debug!("decoded {} records of term {}", records.len(), args.term);

    output_result(
        "Term postings",
        &InspectResult {
            term: args.term,
            text: term.text.clone(),
            term_id: term.term_id,
            list_bytes: bytes.len(),
            num_docs,
            records,
        },
        cli_args,
    )?;

    Ok(())
}

/// Print the default config or validate a config file.
fn show_config(args: ConfigArgs, cli_args: &PosrankArgs) -> Result<()> {
    let (source, config) = match &args.validate {
        Some(path) => {
            let config = RankingConfig::from_json_file(path)
                .with_context(|| format!("invalid config {}", path.display()))?;
            ScoringWeights::new(&config)
                .with_context(|| format!("config {} builds no scoring tables", path.display()))?;
            (path.display().to_string(), config)
        }
        None => ("defaults".to_string(), RankingConfig::default()),
    };

    output_result("Scoring configuration", &ConfigResult { source, config }, cli_args)?;

    Ok(())
}

/// Write a random fixture to a file or stdout.
fn generate_fixture(args: GenerateArgs, cli_args: &PosrankArgs) -> Result<()> {
    let params = GenerateParams {
        docs: args.docs,
        terms: args.terms,
        density: args.density,
        max_postings: args.max_postings,
        ..GenerateParams::default()
    };
    if params.terms == 0 {
        bail!("a fixture needs at least one term");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let fixture = random_fixture(&params, &mut rng);
    let json = fixture.to_json_string(cli_args.pretty)?;

    let Some(path) = &args.output else {
        println!("{json}");
        return Ok(());
    };
    fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;

    let postings = fixture
        .terms
        .iter()
        .flat_map(|t| t.docs.iter())
        .map(|d| d.postings.len())
        .sum();
    output_result(
        "Fixture generated",
        &GenerateResult {
            output: Some(path.display().to_string()),
            terms: fixture.terms.len(),
            docs: args.docs,
            postings,
        },
        cli_args,
    )?;

    Ok(())
}
