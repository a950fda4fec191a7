//! posrank CLI binary.

use std::io::Write;
use std::process;

use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use log::{LevelFilter, debug};

use posrank::cli::args::*;
use posrank::cli::commands::*;
use posrank::config::RankingConfig;

/// Overrides the verbosity flags, `RUST_LOG` syntax.
const LOG_ENV: &str = "POSRANK_LOG";

fn main() {
    let args = PosrankArgs::parse();
    init_logging(args.verbosity());
    debug!("posrank {} ({:?} output)", posrank::VERSION, args.output_format);

    if let Err(e) = preflight(&args).and_then(|()| execute_command(args)) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Ranking logs at the level picked by `-v`/`-q`; dependencies only warn.
fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => LevelFilter::Error, // Quiet mode
        1 => LevelFilter::Warn,  // Default
        2 => LevelFilter::Info,  // Verbose
        _ => LevelFilter::Debug, // Very verbose (3+)
    };

    Builder::new()
        .filter_level(LevelFilter::Warn.min(log_level))
        .filter_module("posrank", log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.module_path().unwrap_or("posrank"),
                record.args()
            )
        })
        .parse_env(Env::new().filter(LOG_ENV))
        .init();
}

/// Reject a bad `--config` (or `POSRANK_CONFIG`) before any fixture is read.
fn preflight(args: &PosrankArgs) -> anyhow::Result<()> {
    let Command::Rank(rank) = &args.command else {
        return Ok(());
    };
    if let Some(path) = &rank.config {
        let config = RankingConfig::from_json_file(path)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(
            "ranking config {}: fixed distance {}",
            path.display(),
            config.fixed_distance
        );
    }
    Ok(())
}
