//! Randomized worker subsets and synthetic densification.
//!
//! Every draw takes the random source as an argument. The sampler itself
//! only borrows the dataset, so one sampler can serve many parallel trials
//! as long as each trial brings its own generator.

use crate::dataset::{Dataset, LabelTable};
use crate::errors::SampleError;
use crate::models::{Subsample, TaskId, WorkerId};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Draws subsamples from a dataset.
pub struct Sampler<'a> {
    dataset: &'a Dataset,
    workers: Vec<WorkerId>,
}

impl<'a> Sampler<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            workers: dataset.worker_ids(),
        }
    }

    /// Pick `size` distinct labelers per task, uniformly without replacement,
    /// from the workers who actually labeled that task.
    pub fn subsample<R: Rng + ?Sized>(
        &self,
        size: usize,
        rng: &mut R,
    ) -> Result<Subsample, SampleError> {
        if size == 0 {
            return Err(SampleError::ZeroSize);
        }

        let mut subsample = Subsample::new();

        for task in self.dataset.task_ids() {
            let labelers = self.dataset.workers_for_task(&task).unwrap_or_default();
            if labelers.len() < size {
                return Err(SampleError::NotEnoughLabelers {
                    task,
                    requested: size,
                    available: labelers.len(),
                });
            }

            let chosen: BTreeSet<WorkerId> = labelers
                .choose_multiple(&mut *rng, size)
                .map(|w| (*w).clone())
                .collect();
            subsample.insert(task, chosen);
        }

        Ok(subsample)
    }

    /// Pick `size` distinct workers per task out of the whole worker
    /// population. Only meaningful against an extrapolated table, where
    /// every worker has labeled every task.
    pub fn extrapolated_subsample<R: Rng + ?Sized>(
        &self,
        size: usize,
        rng: &mut R,
    ) -> Result<Subsample, SampleError> {
        if size == 0 {
            return Err(SampleError::ZeroSize);
        }
        if size > self.workers.len() {
            return Err(SampleError::SizeTooLarge {
                requested: size,
                available: self.workers.len(),
            });
        }

        let subsample = self
            .dataset
            .task_ids()
            .into_iter()
            .map(|task| {
                let chosen: BTreeSet<WorkerId> =
                    self.workers.choose_multiple(&mut *rng, size).cloned().collect();
                (task, chosen)
            })
            .collect();

        Ok(subsample)
    }

    /// Give every worker an opinion on every task.
    ///
    /// Real labels are copied. Of each worker's unlabeled tasks,
    /// `floor(accuracy * remaining)` chosen uniformly at random receive the
    /// ground truth and the rest receive its opposite, so the worker's
    /// accuracy over the full task set tracks their empirical accuracy.
    pub fn extrapolated_dataset<R: Rng + ?Sized>(&self, rng: &mut R) -> LabelTable {
        let accuracies = worker_accuracies(self.dataset);
        let all_tasks = self.dataset.task_ids();
        let mut table = LabelTable::new();

        for (worker, labels) in self.dataset.labels().workers() {
            for (task, label) in labels {
                table.insert(worker, task, *label);
            }

            let mut remaining: Vec<&TaskId> =
                all_tasks.iter().filter(|t| !labels.contains_key(*t)).collect();
            remaining.shuffle(&mut *rng);

            let accuracy = accuracies.get(worker).copied().unwrap_or(0.0);
            let correct = (accuracy * remaining.len() as f64).floor() as usize;

            for (i, task) in remaining.iter().enumerate() {
                // Every task id came from the dataset, so truth is present.
                if let Some(truth) = self.dataset.truth(task) {
                    let label = if i < correct { truth } else { truth.flipped() };
                    table.insert(worker, task, label);
                }
            }

            debug!(
                "Extrapolated worker {}: accuracy {:.3}, {} synthetic labels ({} correct)",
                worker,
                accuracy,
                remaining.len(),
                correct
            );
        }

        info!(
            "Extrapolated table holds {} labels over {} workers",
            table.label_count(),
            table.worker_count()
        );
        table
    }
}

/// Share of each worker's labels that match the ground truth.
pub fn worker_accuracies(dataset: &Dataset) -> BTreeMap<WorkerId, f64> {
    dataset
        .labels()
        .workers()
        .map(|(worker, labels)| {
            let correct = labels
                .iter()
                .filter(|(task, label)| dataset.truth(task) == Some(**label))
                .count();
            let accuracy = if labels.is_empty() {
                0.0
            } else {
                correct as f64 / labels.len() as f64
            };
            (worker.clone(), accuracy)
        })
        .collect()
}
