//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to
//! `.crowdagg.toml` and then to built-in defaults.

use crate::models::Method;
use clap::Parser;
use std::path::PathBuf;

/// crowdagg - compare crowdsourced label aggregators
///
/// Scores majority vote, EM and spectral aggregation against gold labels
/// on random subsamples of a worker/task label table, then densifies the
/// table to see how the spectral method scales. Markdown/JSON reports.
///
/// Examples:
///   crowdagg --input rte.standardized.tsv
///   crowdagg --input rte.tsv --repetitions 20 --sizes 1,3,5,7
///   crowdagg --input rte.tsv --methods majority,svd --no-extrapolation
///   crowdagg --input rte.tsv --seed 42 --format json -o report.json
///   crowdagg --input rte.tsv --dry-run
///   crowdagg --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Tab-separated label table to analyze
    ///
    /// Needs a header row with worker, task, label and gold columns.
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "CROWDAGG_INPUT",
        required_unless_present = "init_config"
    )]
    pub input: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .crowdagg.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Default: from config or crowdagg_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Trials per method and subsample size
    #[arg(short, long, value_name = "COUNT")]
    pub repetitions: Option<usize>,

    /// Labelers per task on the real data (comma-separated)
    ///
    /// Example: --sizes 1,2,3,5,8
    #[arg(long, value_name = "SIZES", value_delimiter = ',')]
    pub sizes: Option<Vec<usize>>,

    /// Labelers per task on the extrapolated table (comma-separated)
    #[arg(long, value_name = "SIZES", value_delimiter = ',')]
    pub extrapolated_sizes: Option<Vec<usize>>,

    /// Methods to score on real data (comma-separated)
    ///
    /// Values: majority, em, svd
    #[arg(short, long, value_name = "METHODS", value_delimiter = ',')]
    pub methods: Option<Vec<Method>>,

    /// Skip the extrapolated phase
    #[arg(long)]
    pub no_extrapolation: bool,

    /// Base random seed
    ///
    /// Runs with the same seed and input produce identical reports.
    /// A fresh seed is drawn and logged when omitted.
    #[arg(long, value_name = "SEED", env = "CROWDAGG_SEED")]
    pub seed: Option<u64>,

    /// Cap on EM iterations
    #[arg(long, value_name = "COUNT")]
    pub max_iterations: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load the table and print its shape without running trials
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .crowdagg.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        match self.input {
            Some(ref input) if !input.is_file() => {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
            None => return Err("An input file is required (--input)".to_string()),
            _ => {}
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.repetitions == Some(0) {
            return Err("Repetitions must be at least 1".to_string());
        }

        if let Some(ref sizes) = self.sizes {
            if sizes.is_empty() || sizes.contains(&0) {
                return Err("Subsample sizes must be at least 1".to_string());
            }
        }

        if let Some(ref sizes) = self.extrapolated_sizes {
            if sizes.contains(&0) {
                return Err("Extrapolated sizes must be at least 1".to_string());
            }
        }

        if let Some(ref methods) = self.methods {
            if methods.is_empty() {
                return Err("At least one method is required".to_string());
            }
        }

        if self.max_iterations == Some(0) {
            return Err("Max iterations must be at least 1".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
