//! Spectral aggregation.
//!
//! The sampled labels form a task-by-worker matrix `M` with zeros where a
//! worker was not sampled. The leading eigenvector of `M * M^T` gives a
//! labeling up to a global sign, which a known good worker then fixes.

use super::eigen::symmetric_eigen;
use super::label_of;
use crate::dataset::LabelTable;
use crate::errors::AggregationError;
use crate::models::{Aggregation, Label, Subsample, TaskId, Verdict, WorkerId};
use ndarray::Array2;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// First sampled worker, in order of appearance, whose labels match the
/// ground truth on a strict majority of their sampled tasks.
pub fn find_good_worker(
    table: &LabelTable,
    truth: &BTreeMap<TaskId, Label>,
    subsample: &Subsample,
) -> Result<WorkerId, AggregationError> {
    let mut order: Vec<&WorkerId> = Vec::new();
    let mut tallies: HashMap<&WorkerId, (usize, usize)> = HashMap::new();

    for (task, workers) in subsample {
        let expected = truth
            .get(task)
            .copied()
            .ok_or_else(|| AggregationError::MissingTruth(task.clone()))?;

        for worker in workers {
            let tally = tallies.entry(worker).or_insert_with(|| {
                order.push(worker);
                (0, 0)
            });
            tally.1 += 1;
            if label_of(table, worker, task)? == expected {
                tally.0 += 1;
            }
        }
    }

    order
        .into_iter()
        .find(|worker| {
            let (correct, total) = tallies[*worker];
            correct * 2 > total
        })
        .cloned()
        .ok_or(AggregationError::NoGoodWorker)
}

/// Task and worker positions in the label matrix.
#[derive(Debug, Clone)]
pub struct MatrixLayout {
    /// Row of each task.
    pub tasks: BTreeMap<TaskId, usize>,
    /// Column of each worker, assigned in order of first appearance.
    pub workers: HashMap<WorkerId, usize>,
}

/// Build the dense task-by-worker matrix of sampled labels.
pub fn label_matrix(
    table: &LabelTable,
    subsample: &Subsample,
) -> Result<(MatrixLayout, Array2<f64>), AggregationError> {
    let mut tasks = BTreeMap::new();
    let mut workers: HashMap<WorkerId, usize> = HashMap::new();

    for (row, (task, sampled)) in subsample.iter().enumerate() {
        tasks.insert(task.clone(), row);
        for worker in sampled {
            let next = workers.len();
            workers.entry(worker.clone()).or_insert(next);
        }
    }

    let mut matrix = Array2::zeros((tasks.len(), workers.len()));
    for (task, sampled) in subsample {
        let row = tasks[task];
        for worker in sampled {
            matrix[[row, workers[worker]]] = label_of(table, worker, task)?.as_f64();
        }
    }

    Ok((MatrixLayout { tasks, workers }, matrix))
}

/// Label every sampled task from the leading eigenvector, signed so that
/// `good_worker` agrees with the result at least as often as not.
pub fn aggregate<R: Rng + ?Sized>(
    table: &LabelTable,
    subsample: &Subsample,
    good_worker: &str,
    rng: &mut R,
) -> Result<Aggregation, AggregationError> {
    if subsample.is_empty() {
        return Err(AggregationError::EmptySubsample);
    }
    let reference = table
        .worker(good_worker)
        .ok_or_else(|| AggregationError::UnknownWorker(good_worker.to_string()))?;

    let (layout, matrix) = label_matrix(table, subsample)?;
    let similarity = matrix.dot(&matrix.t());
    let eigen = symmetric_eigen(&similarity)?;
    let top = eigen
        .largest()
        .ok_or(AggregationError::EigenFailed(similarity.nrows()))?;

    debug!(
        "Spectral: {} tasks x {} workers, leading eigenvalue {:.3}",
        layout.tasks.len(),
        layout.workers.len(),
        eigen.values[top]
    );

    let leading = eigen.vectors.column(top);
    let estimates: Vec<Label> = (0..layout.tasks.len())
        .map(|row| {
            Label::from_sign(leading[row]).unwrap_or_else(|| {
                if rng.gen_bool(0.5) {
                    Label::Negative
                } else {
                    Label::Positive
                }
            })
        })
        .collect();

    let agreement: i64 = reference
        .iter()
        .filter_map(|(task, label)| {
            layout
                .tasks
                .get(task)
                .map(|&row| i64::from(label.value() * estimates[row].value()))
        })
        .sum();

    let flip = agreement < 0;
    debug!("Spectral sign agreement with {}: {} (flip: {})", good_worker, agreement, flip);

    Ok(layout
        .tasks
        .into_iter()
        .map(|(task, row)| {
            let label = if flip {
                estimates[row].flipped()
            } else {
                estimates[row]
            };
            (task, Verdict::Decided(label))
        })
        .collect())
}
