//! Repeated-trial experiments over subsample sizes.
//!
//! A trial draws one subsample and scores every configured method on it.
//! Each trial seeds its own generator from the run seed, the phase, the
//! size and the trial index, so trials run in parallel yet a given seed
//! always reproduces the same report.

use super::error_rate;
use crate::aggregation::AggregationSettings;
use crate::dataset::{Dataset, LabelTable};
use crate::errors::{ExperimentError, SampleError};
use crate::models::{ErrorStats, Label, Method, MethodSeries, TaskId};
use crate::sampler::Sampler;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default subsample sizes on the extrapolated table.
pub const DEFAULT_EXTRAPOLATED_SIZES: [usize; 21] = [
    11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 22, 24, 26, 28, 30, 35, 40, 50, 60, 80, 100,
];

/// What to run.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Trials per (method, size).
    pub repetitions: usize,
    /// Subsample sizes on the real data.
    pub sizes: Vec<usize>,
    /// Subsample sizes on the extrapolated table.
    pub extrapolated_sizes: Vec<usize>,
    /// Methods scored on real subsamples.
    pub methods: Vec<Method>,
    /// Whether to run the extrapolated phase at all.
    pub extrapolate: bool,
    /// Base seed for every trial generator.
    pub seed: u64,
    pub settings: AggregationSettings,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            repetitions: 10,
            sizes: (1..=10).collect(),
            extrapolated_sizes: DEFAULT_EXTRAPOLATED_SIZES.to_vec(),
            methods: Method::ALL.to_vec(),
            extrapolate: true,
            seed: 0,
            settings: AggregationSettings::default(),
            show_progress: false,
        }
    }
}

/// Source of randomness a trial seed is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Real = 1,
    Densify = 2,
    Extrapolated = 3,
}

/// Independent seed for one trial.
pub fn trial_seed(base: u64, phase: Phase, size: usize, trial: usize) -> u64 {
    let key = ((phase as u64) << 56) ^ ((size as u64) << 24) ^ trial as u64;
    splitmix64(base ^ splitmix64(key))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Runs trials against one dataset.
pub struct Experiment<'a> {
    dataset: &'a Dataset,
    truth: BTreeMap<TaskId, Label>,
    sampler: Sampler<'a>,
    config: ExperimentConfig,
    progress: ProgressBar,
}

impl<'a> Experiment<'a> {
    pub fn new(dataset: &'a Dataset, config: ExperimentConfig) -> Self {
        let progress = if config.show_progress {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} trials {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            dataset,
            truth: dataset.ground_truth(),
            sampler: Sampler::new(dataset),
            config,
            progress,
        }
    }

    /// Check every requested size against the data before any trial runs.
    pub fn validate(&self) -> Result<(), SampleError> {
        let labelers = self.dataset.min_labelers_per_task();
        for &size in &self.config.sizes {
            if size == 0 {
                return Err(SampleError::ZeroSize);
            }
            if size > labelers {
                let task = self
                    .dataset
                    .tasks()
                    .find(|(_, e)| e.labels.len() < size)
                    .map(|(t, _)| t.clone())
                    .unwrap_or_default();
                return Err(SampleError::NotEnoughLabelers {
                    task,
                    requested: size,
                    available: labelers,
                });
            }
        }

        if self.config.extrapolate {
            let workers = self.dataset.worker_count();
            for &size in &self.config.extrapolated_sizes {
                if size == 0 {
                    return Err(SampleError::ZeroSize);
                }
                if size > workers {
                    return Err(SampleError::SizeTooLarge {
                        requested: size,
                        available: workers,
                    });
                }
            }
        }

        Ok(())
    }

    /// Both phases: real data, then the extrapolated table if enabled.
    pub fn run(&self) -> Result<(Vec<MethodSeries>, Option<MethodSeries>), ExperimentError> {
        self.validate()?;

        let mut total = self.config.sizes.len() * self.config.repetitions;
        if self.config.extrapolate {
            total += self.config.extrapolated_sizes.len() * self.config.repetitions;
        }
        self.progress.set_length(total as u64);

        let real = self.run_real()?;
        let extrapolated = if self.config.extrapolate {
            Some(self.run_extrapolated()?)
        } else {
            None
        };

        self.progress.finish_and_clear();
        Ok((real, extrapolated))
    }

    /// Score every configured method on real subsamples of each size.
    pub fn run_real(&self) -> Result<Vec<MethodSeries>, ExperimentError> {
        let mut series: Vec<MethodSeries> = self
            .config
            .methods
            .iter()
            .map(|m| MethodSeries::new(*m))
            .collect();

        for &size in &self.config.sizes {
            self.progress.set_message(format!("real k={}", size));
            info!("Running {} trials at subsample size {}", self.config.repetitions, size);

            let trials: Vec<Vec<f64>> = (0..self.config.repetitions)
                .into_par_iter()
                .map(|trial| {
                    let errors = self.run_real_trial(size, trial);
                    self.progress.inc(1);
                    errors
                })
                .collect::<Result<_, _>>()?;

            for (i, entry) in series.iter_mut().enumerate() {
                let errors: Vec<f64> = trials.iter().map(|t| t[i]).collect();
                let stats = ErrorStats::from_trials(errors);
                info!("  {:<24} k={:<3} mean error {:.4}", entry.method.to_string(), size, stats.mean);
                entry.by_size.insert(size, stats);
            }
        }

        Ok(series)
    }

    /// One real-data trial: error of each configured method, in order.
    pub fn run_real_trial(&self, size: usize, trial: usize) -> Result<Vec<f64>, ExperimentError> {
        let mut rng = StdRng::seed_from_u64(trial_seed(self.config.seed, Phase::Real, size, trial));
        let subsample = self.sampler.subsample(size, &mut rng)?;

        self.config
            .methods
            .iter()
            .map(|method| -> Result<f64, ExperimentError> {
                let aggregation = method.aggregate(
                    self.dataset.labels(),
                    &self.truth,
                    &subsample,
                    &self.config.settings,
                    &mut rng,
                )?;
                let error = error_rate(&aggregation, &self.truth)?;
                debug!("Trial {} k={} {}: error {:.4}", trial, size, method, error);
                Ok(error)
            })
            .collect()
    }

    /// Densify the dataset and score the spectral method at each
    /// extrapolated size.
    pub fn run_extrapolated(&self) -> Result<MethodSeries, ExperimentError> {
        info!(
            "Extrapolating {} workers over {} tasks",
            self.dataset.worker_count(),
            self.dataset.task_count()
        );
        let mut rng = StdRng::seed_from_u64(trial_seed(self.config.seed, Phase::Densify, 0, 0));
        let table = self.sampler.extrapolated_dataset(&mut rng);

        let mut series = MethodSeries::new(Method::Spectral);

        for &size in &self.config.extrapolated_sizes {
            self.progress.set_message(format!("extrapolated k={}", size));
            info!(
                "Running {} extrapolated trials at subsample size {}",
                self.config.repetitions, size
            );

            let errors: Vec<f64> = (0..self.config.repetitions)
                .into_par_iter()
                .map(|trial| {
                    let error = self.run_extrapolated_trial(&table, size, trial);
                    self.progress.inc(1);
                    error
                })
                .collect::<Result<_, _>>()?;

            let stats = ErrorStats::from_trials(errors);
            info!("  {:<24} k={:<3} mean error {:.4}", "SVD (extrapolated)", size, stats.mean);
            series.by_size.insert(size, stats);
        }

        Ok(series)
    }

    fn run_extrapolated_trial(
        &self,
        table: &LabelTable,
        size: usize,
        trial: usize,
    ) -> Result<f64, ExperimentError> {
        let mut rng = StdRng::seed_from_u64(trial_seed(self.config.seed, Phase::Extrapolated, size, trial));
        let subsample = self.sampler.extrapolated_subsample(size, &mut rng)?;
        let aggregation = Method::Spectral.aggregate(
            table,
            &self.truth,
            &subsample,
            &self.config.settings,
            &mut rng,
        )?;
        let error = error_rate(&aggregation, &self.truth)?;
        debug!("Extrapolated trial {} k={}: error {:.4}", trial, size, error);
        Ok(error)
    }
}
