//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.crowdagg.toml` files.

use crate::aggregation::{em, AggregationSettings};
use crate::evaluation::harness::DEFAULT_EXTRAPOLATED_SIZES;
use crate::evaluation::ExperimentConfig;
use crate::models::Method;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".crowdagg.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input column names.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Trial settings.
    #[serde(default)]
    pub experiment: RunConfig,

    /// Aggregator settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Base seed. A fresh one is drawn and logged when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            seed: None,
        }
    }
}

fn default_output() -> String {
    "crowdagg_report.md".to_string()
}

/// Header names of the required input columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_worker_column")]
    pub worker_column: String,

    #[serde(default = "default_task_column")]
    pub task_column: String,

    #[serde(default = "default_label_column")]
    pub label_column: String,

    #[serde(default = "default_truth_column")]
    pub truth_column: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            worker_column: default_worker_column(),
            task_column: default_task_column(),
            label_column: default_label_column(),
            truth_column: default_truth_column(),
        }
    }
}

fn default_worker_column() -> String {
    "!amt_worker_ids".to_string()
}

fn default_task_column() -> String {
    "orig_id".to_string()
}

fn default_label_column() -> String {
    "response".to_string()
}

fn default_truth_column() -> String {
    "gold".to_string()
}

/// Trial settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Trials per (method, size).
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Subsample sizes on the real data.
    #[serde(default = "default_sizes")]
    pub sizes: Vec<usize>,

    /// Subsample sizes on the extrapolated table.
    #[serde(default = "default_extrapolated_sizes")]
    pub extrapolated_sizes: Vec<usize>,

    /// Methods scored on real data.
    #[serde(default = "default_methods")]
    pub methods: Vec<Method>,

    /// Run the extrapolated phase.
    #[serde(default = "default_true")]
    pub extrapolate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            sizes: default_sizes(),
            extrapolated_sizes: default_extrapolated_sizes(),
            methods: default_methods(),
            extrapolate: true,
        }
    }
}

fn default_repetitions() -> usize {
    10
}

fn default_sizes() -> Vec<usize> {
    (1..=10).collect()
}

fn default_extrapolated_sizes() -> Vec<usize> {
    DEFAULT_EXTRAPOLATED_SIZES.to_vec()
}

fn default_methods() -> Vec<Method> {
    Method::ALL.to_vec()
}

/// Aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Cap on EM iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> usize {
    em::MAX_ITERATIONS
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// List every trial's error in the Markdown report.
    #[serde(default = "default_true")]
    pub include_trials: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_trials: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(seed) = args.seed {
            self.general.seed = Some(seed);
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(repetitions) = args.repetitions {
            self.experiment.repetitions = repetitions;
        }
        if let Some(ref sizes) = args.sizes {
            self.experiment.sizes = sizes.clone();
        }
        if let Some(ref sizes) = args.extrapolated_sizes {
            self.experiment.extrapolated_sizes = sizes.clone();
        }
        if let Some(ref methods) = args.methods {
            self.experiment.methods = methods.clone();
        }
        if args.no_extrapolation {
            self.experiment.extrapolate = false;
        }

        if let Some(max_iterations) = args.max_iterations {
            self.aggregation.max_iterations = max_iterations;
        }
    }

    /// Reject settings no experiment can run with.
    pub fn validate(&self) -> Result<()> {
        if self.experiment.repetitions == 0 {
            bail!("repetitions must be at least 1");
        }
        if self.experiment.sizes.is_empty() {
            bail!("at least one subsample size is required");
        }
        if self.experiment.sizes.contains(&0) || self.experiment.extrapolated_sizes.contains(&0) {
            bail!("subsample sizes must be at least 1");
        }
        if self.experiment.methods.is_empty() {
            bail!("at least one aggregation method is required");
        }
        if self.aggregation.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }
        Ok(())
    }

    /// Harness settings for a run with the given seed.
    pub fn experiment_config(&self, seed: u64, show_progress: bool) -> ExperimentConfig {
        let mut seen = BTreeSet::new();
        let methods: Vec<Method> = self
            .experiment
            .methods
            .iter()
            .copied()
            .filter(|m| seen.insert(*m))
            .collect();

        ExperimentConfig {
            repetitions: self.experiment.repetitions,
            sizes: self.experiment.sizes.clone(),
            extrapolated_sizes: self.experiment.extrapolated_sizes.clone(),
            methods,
            extrapolate: self.experiment.extrapolate && !self.experiment.extrapolated_sizes.is_empty(),
            seed,
            settings: AggregationSettings::from(&self.aggregation),
            show_progress,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
