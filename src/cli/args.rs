//! Command line argument parsing for the posrank CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// posrank - posting-list intersection and proximity ranking
#[derive(Parser, Debug, Clone)]
#[command(name = "posrank")]
#[command(about = "Rank documents of a posting-list fixture by term proximity")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PosrankArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", env = "POSRANK_FORMAT")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PosrankArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Rank the documents of a fixture
    Rank(RankArgs),

    /// Decode and print the postings of one fixture term
    Inspect(InspectArgs),

    /// Print or validate a scoring configuration
    Config(ConfigArgs),

    /// Write a random fixture
    Generate(GenerateArgs),
}

/// Arguments for ranking a fixture
#[derive(Parser, Debug, Clone)]
pub struct RankArgs {
    /// Fixture file (JSON)
    #[arg(value_name = "FIXTURE")]
    pub fixture: PathBuf,

    /// Scoring configuration file, overrides the fixture's config
    #[arg(short, long, value_name = "CONFIG_FILE", env = "POSRANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of results, overrides the fixture's request
    #[arg(short = 'n', long)]
    pub top: Option<usize>,

    /// Print the score breakdown of every result
    #[arg(long)]
    pub explain: bool,

    /// Score every candidate instead of pruning
    #[arg(long)]
    pub no_prune: bool,

    /// Query language id
    #[arg(long)]
    pub language: Option<u8>,
}

/// Arguments for inspecting a term
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Fixture file (JSON)
    #[arg(value_name = "FIXTURE")]
    pub fixture: PathBuf,

    /// Index of the query term
    #[arg(short, long, default_value = "0")]
    pub term: usize,
}

/// Arguments for the config command
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Validate this file instead of printing the defaults
    #[arg(long, value_name = "CONFIG_FILE")]
    pub validate: Option<PathBuf>,
}

/// Arguments for generating a random fixture
#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    /// Output file, stdout when absent
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Number of documents
    #[arg(long, default_value = "1000")]
    pub docs: usize,

    /// Number of query terms
    #[arg(long, default_value = "3")]
    pub terms: usize,

    /// Probability that a document contains a given term
    #[arg(long, default_value = "0.3")]
    pub density: f64,

    /// Maximum postings per term and document
    #[arg(long, default_value = "8")]
    pub max_postings: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_command() {
        let args = PosrankArgs::try_parse_from([
            "posrank",
            "rank",
            "fixture.json",
            "--top",
            "20",
            "--explain",
        ])
        .unwrap();

        if let Command::Rank(rank_args) = args.command {
            assert_eq!(rank_args.fixture, PathBuf::from("fixture.json"));
            assert_eq!(rank_args.top, Some(20));
            assert!(rank_args.explain);
            assert!(!rank_args.no_prune);
        } else {
            panic!("Expected Rank command");
        }
    }

    #[test]
    fn test_inspect_command() {
        let args =
            PosrankArgs::try_parse_from(["posrank", "inspect", "fixture.json", "--term", "2"])
                .unwrap();

        if let Command::Inspect(inspect_args) = args.command {
            assert_eq!(inspect_args.term, 2);
        } else {
            panic!("Expected Inspect command");
        }
    }

    #[test]
    fn test_generate_defaults() {
        let args = PosrankArgs::try_parse_from(["posrank", "generate", "--seed", "7"]).unwrap();

        if let Command::Generate(gen_args) = args.command {
            assert_eq!(gen_args.seed, 7);
            assert_eq!(gen_args.terms, 3);
            assert!(gen_args.output.is_none());
        } else {
            panic!("Expected Generate command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let args = PosrankArgs::try_parse_from(["posrank", "config"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = PosrankArgs::try_parse_from(["posrank", "-vv", "config"]).unwrap();
        assert_eq!(args.verbosity(), 2);

        let args = PosrankArgs::try_parse_from(["posrank", "-q", "-vvv", "config"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            PosrankArgs::try_parse_from(["posrank", "--format", "json", "--pretty", "config"])
                .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
    }
}
