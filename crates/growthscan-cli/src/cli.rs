//! CLI argument definitions for growthscan.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Match, retrieve and score a batch of company queries |
//! | `match` | Resolve queries against the reference directory only |
//! | `directory` | List the reference directory |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings and errors as failures |
//! | `--timeout-ms` | env or `10000` | Per-provider call timeout |
//! | `--concurrency` | env or `4` | Tickers retrieved in parallel |
//! | `--directory-file` | unset | Load the directory from a local JSON file |
//!
//! # Examples
//!
//! ```bash
//! growthscan analyze "apple, berkshire hathaway, nvidia" --pretty
//! growthscan analyze "microsoft, alphabet" --format table --export scores.csv
//! growthscan match "bank, america"
//! growthscan directory --sector "Information Technology"
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Growth screening over S&P 500 companies.
///
/// Resolves free-text company names against the S&P 500 constituents list,
/// pulls fundamentals from Yahoo Finance with per-ticker fallback to
/// Alpha Vantage, and ranks the companies by a weighted growth score.
#[derive(Debug, Parser)]
#[command(
    name = "growthscan",
    author,
    version,
    about = "Growth screening over S&P 500 companies"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Per-provider call timeout in milliseconds. Overrides
    /// GROWTHSCAN_PROVIDER_TIMEOUT_MS.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Number of tickers retrieved in parallel. Overrides
    /// GROWTHSCAN_MAX_CONCURRENCY.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Read the reference directory from a JSON file instead of the web.
    #[arg(long, global = true)]
    pub directory_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, default_value_t = false, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Match, retrieve and score a comma-separated batch of company queries.
    Analyze(AnalyzeArgs),
    /// Resolve a batch of queries to tickers without fetching any data.
    Match(MatchArgs),
    /// List the reference directory.
    Directory(DirectoryArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Comma-separated company queries, e.g. "apple, berkshire hathaway".
    pub batch: String,

    /// Clamp every sub-score into [0, 1] so scores stay within [0, 100].
    #[arg(long, default_value_t = false)]
    pub bounded: bool,

    /// Write the ranked score records to a CSV file.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Years of daily closes to request from the primary provider.
    #[arg(long)]
    pub history_years: Option<u16>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Comma-separated company queries.
    pub batch: String,
}

#[derive(Debug, Args)]
pub struct DirectoryArgs {
    /// Only list companies in this GICS sector (case-insensitive).
    #[arg(long)]
    pub sector: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_analyze_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "growthscan",
            "analyze",
            "apple, nvidia",
            "--bounded",
            "--export",
            "out.csv",
            "--format",
            "table",
            "--timeout-ms",
            "2500",
            "-vv",
        ])
        .expect("valid arguments");

        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.timeout_ms, Some(2_500));
        assert_eq!(cli.verbose, 2);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.batch, "apple, nvidia");
        assert!(args.bounded);
        assert_eq!(args.export, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["growthscan", "-q", "-v", "match", "apple"]);
        assert!(result.is_err());
    }
}
