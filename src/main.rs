//! crowdagg - crowdsourced binary label aggregation experiments
//!
//! A CLI tool that loads a worker/task label table with gold labels,
//! scores majority vote, EM and spectral aggregation on random
//! subsamples, and writes a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad input, config, infeasible sizes, etc.)

mod aggregation;
mod cli;
mod config;
mod dataset;
mod errors;
mod evaluation;
mod models;
mod report;
mod sampler;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use dataset::{ColumnNames, Dataset};
use evaluation::Experiment;
use models::{ExperimentReport, ReportMetadata};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The config file may ask for verbose output, so peek at it before logging starts
    let file_verbose = !args.quiet && config_requests_verbose(&args);
    init_logging(&args, file_verbose)?;

    info!("crowdagg v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args) {
        error!("Experiment failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .crowdagg.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize columns, sizes, methods, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the level picked by `-v`/`-q`.
fn init_logging(args: &Args, file_verbose: bool) -> Result<()> {
    let level = if file_verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Run the complete experiment workflow.
fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let input = args
        .input
        .clone()
        .context("An input file is required (--input)")?;

    // Step 1: Load the label table
    println!("📥 Loading labels: {}", input.display());
    let columns = ColumnNames::from(&config.dataset);
    let dataset = Dataset::load(&input, &columns)
        .with_context(|| format!("Failed to load dataset from {}", input.display()))?;
    let stats = dataset.stats();

    if args.dry_run {
        return handle_dry_run(&dataset, &config);
    }

    // Step 2: Resolve the seed
    let seed = match config.general.seed {
        Some(seed) => seed,
        None => {
            let seed: u64 = rand::thread_rng().gen();
            info!("No seed given, drew {}", seed);
            seed
        }
    };

    // Step 3: Run the trials
    println!("\n🔬 Running experiments...");
    println!(
        "   Methods: {}",
        config
            .experiment
            .methods
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   Repetitions: {}", config.experiment.repetitions);
    println!("   Seed: {}", seed);

    let experiment = Experiment::new(&dataset, config.experiment_config(seed, !args.quiet));
    let (real, extrapolated) = experiment.run()?;

    // Step 4: Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let report = ExperimentReport {
        metadata: ReportMetadata {
            input: input.display().to_string(),
            run_date: Utc::now(),
            seed,
            repetitions: config.experiment.repetitions,
            dataset: stats,
            duration_seconds: duration,
        },
        real,
        extrapolated,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&report, config.report.include_trials)
        }
    };

    let output_path = PathBuf::from(&config.general.output);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report);
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Experiment complete! Report saved to: {}",
        output_path.display()
    );

    Ok(())
}

/// Print the winning method at each real size and the extrapolated tail.
fn print_summary(report: &ExperimentReport) {
    println!("\n📊 Results Summary:");
    for size in report.real_sizes() {
        if let Some((method, mean)) = report.best_method_at(size) {
            println!("   k={:<3} best: {} ({:.4})", size, method, mean);
        }
    }

    if let Some(ref series) = report.extrapolated {
        if let Some((size, stats)) = series.by_size.iter().next_back() {
            println!("   Extrapolated k={}: {} error {:.4}", size, series.method, stats.mean);
        }
    }
}

/// Handle --dry-run: print the table's shape and the planned work, exit.
fn handle_dry_run(dataset: &Dataset, config: &Config) -> Result<()> {
    let stats = dataset.stats();

    println!("\n🔍 Dry run: dataset loaded, no trials run.\n");
    println!("   Tasks: {}", stats.tasks);
    println!("   Workers: {}", stats.workers);
    println!("   Labels: {}", stats.records);
    println!(
        "   Labelers per task: {}-{}",
        stats.min_labelers_per_task, stats.max_labelers_per_task
    );
    println!("   Positive gold: {:.1}%", stats.positive_share * 100.0);

    let accuracies = sampler::worker_accuracies(dataset);
    if !accuracies.is_empty() {
        let mean = accuracies.values().sum::<f64>() / accuracies.len() as f64;
        println!("   Mean worker accuracy: {:.3}", mean);
    }

    let experiment = Experiment::new(dataset, config.experiment_config(0, false));
    match experiment.validate() {
        Ok(()) => println!("\n   Sizes {:?} are feasible.", config.experiment.sizes),
        Err(e) => warn!("Planned run would fail: {}", e),
    }

    println!("\n✅ Dry run complete.");
    Ok(())
}

/// Whether the config file that `load_config` would pick sets `verbose`.
fn config_requests_verbose(args: &Args) -> bool {
    let config = match args.config {
        Some(ref path) => Config::load(path).ok(),
        None => Config::load_default().ok().flatten(),
    };
    config.map(|c| c.general.verbose).unwrap_or(false)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
