//! Output formatting for CLI commands.

use std::io::{self, Write};

use serde::Serialize;

use crate::cli::args::{OutputFormat, PosrankArgs};
use crate::config::RankingConfig;
use crate::error::Result;
use crate::posting::{NumericValue, PostingFields};
use crate::ranking::{DocExplanation, RankingStats};

/// Plain text rendering of a command result.
pub trait HumanOutput {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDoc {
    pub rank: usize,
    pub doc_id: u64,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int_score: Option<i32>,
    pub flags: u32,
}

/// Result of the rank command.
#[derive(Debug, Serialize)]
pub struct RankResults<'a> {
    pub num_terms: usize,
    pub results: Vec<RankedDoc>,
    pub stats: RankingStats,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub explanations: Vec<DocExplanation<'a>>,
}

/// One decoded record of a termlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordInfo {
    pub offset: usize,
    pub width: usize,
    pub doc_id: u64,
    pub site_rank: u8,
    pub lang: u8,
    pub delete_marker: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posting: Option<PostingFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<NumericValue>,
}

/// Result of the inspect command.
#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub term: usize,
    pub text: String,
    pub term_id: u64,
    pub list_bytes: usize,
    pub num_docs: usize,
    pub records: Vec<RecordInfo>,
}

/// Result of the config command.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigResult {
    pub source: String,
    pub config: RankingConfig,
}

/// Result of the generate command.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub terms: usize,
    pub docs: usize,
    pub postings: usize,
}

impl HumanOutput for RankResults<'_> {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} results for {} terms ({} ms)",
            self.results.len(),
            self.num_terms,
            self.duration_ms
        )?;
        writeln!(out)?;
        writeln!(out, "{:>4}  {:>12}  {:>14}  {:>6}", "rank", "doc_id", "score", "flags")?;
        for doc in &self.results {
            let score = match doc.int_score {
                Some(v) => v.to_string(),
                None => format!("{:.4}", doc.score),
            };
            writeln!(
                out,
                "{:>4}  {:>12}  {:>14}  {:>6x}",
                doc.rank, doc.doc_id, score, doc.flags
            )?;
        }

        let s = &self.stats;
        writeln!(out)?;
        writeln!(
            out,
            "candidates {}, scored {}, pruned {} by max score and {} by distance",
            s.candidates, s.scored, s.pruned_max_score, s.pruned_distance
        )?;
        writeln!(
            out,
            "filtered {}, not in index {}, zero score {}",
            s.filtered, s.not_in_index, s.skipped_zero_score
        )?;

        for e in &self.explanations {
            writeln!(out)?;
            writeln!(
                out,
                "doc {}: final {:.4}, min single {:.4}, min pair {:.4}, site rank {}, lang {}",
                e.doc.doc_id,
                e.doc.final_score,
                e.doc.min_single_score,
                e.doc.min_pair_score,
                e.doc.site_rank,
                e.doc.lang
            )?;
            for single in e.single_scores {
                writeln!(
                    out,
                    "  term {} @{} {:?}: {:.4}",
                    single.qterm, single.word_pos, single.hash_group, single.final_score
                )?;
            }
            for pair in e.pair_scores {
                writeln!(
                    out,
                    "  pair {}-{} @{}/{} {:?}/{:?}: {:.4}",
                    pair.qterm_i,
                    pair.qterm_j,
                    pair.word_pos_i,
                    pair.word_pos_j,
                    pair.hash_group_i,
                    pair.hash_group_j,
                    pair.final_score
                )?;
            }
        }
        Ok(())
    }
}

impl HumanOutput for InspectResult {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "term {} {:?} (id {}): {} bytes, {} documents",
            self.term, self.text, self.term_id, self.list_bytes, self.num_docs
        )?;
        for r in &self.records {
            let marker = if r.delete_marker { " deleted" } else { "" };
            write!(
                out,
                "{:>8} [{:>2}] doc {} sr {} lang {}{marker}",
                r.offset, r.width, r.doc_id, r.site_rank, r.lang
            )?;
            if let Some(p) = &r.posting {
                write!(
                    out,
                    ": pos {} {:?} density {} diversity {} spam {}",
                    p.word_pos, p.hash_group, p.density_rank, p.diversity_rank, p.word_spam_rank
                )?;
                if p.synonym {
                    write!(out, " synonym")?;
                }
                if p.half_stop_wiki_bigram {
                    write!(out, " wiki-bigram")?;
                }
            }
            match r.value {
                Some(NumericValue::Float(v)) => write!(out, ": {v}")?,
                Some(NumericValue::Int(v)) => write!(out, ": {v}")?,
                None => {}
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl HumanOutput for ConfigResult {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        let c = &self.config;
        let w = &c.hash_group_weights;
        writeln!(out, "source: {}", self.source)?;
        writeln!(
            out,
            "hash group weights: body {} title {} heading {} list {} meta {} link {}",
            w.body, w.title, w.heading, w.in_list, w.in_meta_tag, w.in_link_text
        )?;
        writeln!(
            out,
            "                    tag {} neighborhood {} internal link {} url {} menu {}",
            w.in_tag, w.neighborhood, w.internal_link_text, w.in_url, w.in_menu
        )?;
        writeln!(
            out,
            "diversity: {}..{}",
            c.diversity_weight_min, c.diversity_weight_max
        )?;
        writeln!(out, "density: {}..{}", c.density_weight_min, c.density_weight_max)?;
        writeln!(out, "fixed distance: {}", c.fixed_distance)?;
        writeln!(out, "wiki weight: {}", c.wiki_weight)?;
        writeln!(out, "wiki bigram weight: {}", c.wiki_bigram_weight)?;
        writeln!(out, "site rank multiplier: {}", c.site_rank_multiplier)?;
        writeln!(out, "max sublists: {}", c.max_sublists)
    }
}

impl HumanOutput for GenerateResult {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "generated {} terms over {} documents, {} postings",
            self.terms, self.docs, self.postings
        )?;
        if let Some(path) = &self.output {
            writeln!(out, "written to {path}")?;
        }
        Ok(())
    }
}

/// Output a result in the specified format.
pub fn output_result<T>(message: &str, result: &T, args: &PosrankArgs) -> Result<()>
where
    T: Serialize + HumanOutput,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_result(&mut out, message, result, args)
}

/// Like [`output_result`] but into any writer.
pub fn write_result<T>(
    out: &mut dyn Write,
    message: &str,
    result: &T,
    args: &PosrankArgs,
) -> Result<()>
where
    T: Serialize + HumanOutput,
{
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                writeln!(out, "{message}")?;
                writeln!(out)?;
            }
            result.write_human(out)?;
        }
        OutputFormat::Json => {
            let json = if args.pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            writeln!(out, "{json}")?;
        }
    }
    Ok(())
}
