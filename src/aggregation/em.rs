//! Estimation-maximization weighted voting.
//!
//! Alternates a weighted majority over the sampled labels with a weight
//! update that scores each worker by agreement with the current estimate,
//! until two consecutive estimates match or the iteration cap is reached.

use super::label_of;
use crate::dataset::LabelTable;
use crate::errors::AggregationError;
use crate::models::{Aggregation, Label, Subsample, TaskId, Verdict, WorkerId};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

/// Default bound on weighted-majority passes.
pub const MAX_ITERATIONS: usize = 20;

/// Result of an EM run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmOutcome {
    /// Per-task estimate that was returned.
    pub estimate: BTreeMap<TaskId, Label>,
    /// Weighted-majority passes performed.
    pub iterations: usize,
    /// Whether the last pass reproduced the previous estimate.
    pub converged: bool,
}

impl EmOutcome {
    pub fn into_aggregation(self) -> Aggregation {
        self.estimate
            .into_iter()
            .map(|(task, label)| (task, Verdict::Decided(label)))
            .collect()
    }
}

/// Run EM on `subsample`.
///
/// At the cap the estimate the current weights were fitted to is returned,
/// not a fresh weighted majority from those weights. At least one pass is
/// always made.
pub fn run<R: Rng + ?Sized>(
    table: &LabelTable,
    subsample: &Subsample,
    max_iterations: usize,
    rng: &mut R,
) -> Result<EmOutcome, AggregationError> {
    if subsample.is_empty() {
        return Err(AggregationError::EmptySubsample);
    }

    let mut weights: BTreeMap<WorkerId, f64> = BTreeMap::new();
    let mut previous: Option<BTreeMap<TaskId, Label>> = None;
    let mut iterations = 0;

    while iterations < max_iterations.max(1) {
        let estimate = weighted_majority(table, subsample, &weights, &mut *rng)?;
        iterations += 1;

        if previous.as_ref() == Some(&estimate) {
            debug!("EM converged after {} iterations", iterations);
            return Ok(EmOutcome {
                estimate,
                iterations,
                converged: true,
            });
        }

        weights = update_weights(table, subsample, &estimate)?;
        previous = Some(estimate);
    }

    debug!("EM stopped at the {} iteration cap without converging", iterations);

    Ok(EmOutcome {
        estimate: previous.unwrap_or_default(),
        iterations,
        converged: false,
    })
}

/// Weighted sign per task. Workers without a weight count as 1; an exact
/// zero is broken uniformly at random.
pub fn weighted_majority<R: Rng + ?Sized>(
    table: &LabelTable,
    subsample: &Subsample,
    weights: &BTreeMap<WorkerId, f64>,
    rng: &mut R,
) -> Result<BTreeMap<TaskId, Label>, AggregationError> {
    let mut estimate = BTreeMap::new();

    for (task, workers) in subsample {
        let mut sum = 0.0;
        for worker in workers {
            let weight = weights.get(worker).copied().unwrap_or(1.0);
            sum += label_of(table, worker, task)?.as_f64() * weight;
        }

        let label = Label::from_sign(sum).unwrap_or_else(|| {
            if rng.gen_bool(0.5) {
                Label::Negative
            } else {
                Label::Positive
            }
        });
        estimate.insert(task.clone(), label);
    }

    Ok(estimate)
}

/// Weight each sampled worker by `2 * agreement - 1`, so full agreement
/// with `estimate` is 1, coin-flip agreement 0 and full disagreement -1.
pub fn update_weights(
    table: &LabelTable,
    subsample: &Subsample,
    estimate: &BTreeMap<TaskId, Label>,
) -> Result<BTreeMap<WorkerId, f64>, AggregationError> {
    let mut tallies: BTreeMap<&WorkerId, (usize, usize)> = BTreeMap::new();

    for (task, workers) in subsample {
        let Some(current) = estimate.get(task) else {
            continue;
        };
        for worker in workers {
            let tally = tallies.entry(worker).or_insert((0, 0));
            tally.1 += 1;
            if label_of(table, worker, task)? == *current {
                tally.0 += 1;
            }
        }
    }

    Ok(tallies
        .into_iter()
        .map(|(worker, (correct, total))| {
            (worker.clone(), 2.0 * (correct as f64 / total as f64) - 1.0)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::test_support::{subsample_of, table_of};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_update_weights() {
        let table = table_of(&[
            ("a", "t1", 1),
            ("a", "t2", 1),
            ("b", "t1", 1),
            ("b", "t2", -1),
            ("c", "t1", -1),
            ("c", "t2", -1),
        ]);
        let subsample = subsample_of(&[("t1", "a b c"), ("t2", "a b c")]);
        let estimate: BTreeMap<TaskId, Label> = [
            ("t1".to_string(), Label::Positive),
            ("t2".to_string(), Label::Positive),
        ]
        .into_iter()
        .collect();

        let weights = update_weights(&table, &subsample, &estimate).unwrap();
        assert_eq!(weights["a"], 1.0);
        assert_eq!(weights["b"], 0.0);
        assert_eq!(weights["c"], -1.0);
    }

    #[test]
    fn test_weighted_majority_uses_weights() {
        let table = table_of(&[("a", "t1", 1), ("b", "t1", -1), ("c", "t1", -1)]);
        let subsample = subsample_of(&[("t1", "a b c")]);
        let weights: BTreeMap<WorkerId, f64> = [
            ("a".to_string(), 1.0),
            ("b".to_string(), 0.25),
            ("c".to_string(), 0.25),
        ]
        .into_iter()
        .collect();

        let mut rng = StdRng::seed_from_u64(0);
        let estimate = weighted_majority(&table, &subsample, &weights, &mut rng).unwrap();
        assert_eq!(estimate["t1"], Label::Positive);

        let unweighted = weighted_majority(&table, &subsample, &BTreeMap::new(), &mut rng).unwrap();
        assert_eq!(unweighted["t1"], Label::Negative);
    }

    #[test]
    fn test_ties_are_broken() {
        let table = table_of(&[("a", "t1", 1), ("b", "t1", -1)]);
        let subsample = subsample_of(&[("t1", "a b")]);
        let mut rng = StdRng::seed_from_u64(3);

        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..64 {
            let estimate = weighted_majority(&table, &subsample, &BTreeMap::new(), &mut rng).unwrap();
            seen.insert(estimate["t1"]);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_converges_on_unanimous_data() {
        let table = table_of(&[
            ("a", "t1", 1),
            ("b", "t1", 1),
            ("a", "t2", -1),
            ("b", "t2", -1),
        ]);
        let subsample = subsample_of(&[("t1", "a b"), ("t2", "a b")]);

        let outcome = run(&table, &subsample, MAX_ITERATIONS, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.estimate["t1"], Label::Positive);
        assert_eq!(outcome.estimate["t2"], Label::Negative);

        let aggregation = outcome.into_aggregation();
        assert!(aggregation.values().all(|v| v.value() != 0));
    }

    #[test]
    fn test_converged_result_is_fixed_point() {
        let dataset = crate::dataset::test_support::synthetic(80, 12, 5, 21);
        let sampler = crate::sampler::Sampler::new(&dataset);
        let mut rng = StdRng::seed_from_u64(4);
        let subsample = sampler.subsample(5, &mut rng).unwrap();

        let outcome = run(dataset.labels(), &subsample, MAX_ITERATIONS, &mut rng).unwrap();
        assert!(outcome.iterations <= MAX_ITERATIONS);

        if outcome.converged {
            let weights = update_weights(dataset.labels(), &subsample, &outcome.estimate).unwrap();
            let next = weighted_majority(dataset.labels(), &subsample, &weights, &mut rng).unwrap();
            for (task, label) in &next {
                // Only exact ties may move under re-drawn tie-breaks.
                let sum: f64 = subsample[task]
                    .iter()
                    .map(|w| dataset.labels().get(w, task).unwrap().as_f64() * weights[w])
                    .sum();
                if sum != 0.0 {
                    assert_eq!(outcome.estimate[task], *label);
                }
            }
        }
    }

    /// Worker `c` mostly dissents, so once weights are fitted its vote
    /// flips sign and overturns the unweighted result on t3 and t4.
    fn shifting_table() -> (LabelTable, Subsample) {
        let table = table_of(&[
            ("a", "t1", 1),
            ("b", "t1", 1),
            ("c", "t1", -1),
            ("a", "t2", 1),
            ("b", "t2", 1),
            ("c", "t2", -1),
            ("a", "t3", 1),
            ("b", "t3", -1),
            ("c", "t3", -1),
            ("a", "t4", -1),
            ("b", "t4", 1),
            ("c", "t4", -1),
            ("a", "t5", 1),
            ("b", "t5", 1),
            ("c", "t5", -1),
        ]);
        let subsample = subsample_of(&[
            ("t1", "a b c"),
            ("t2", "a b c"),
            ("t3", "a b c"),
            ("t4", "a b c"),
            ("t5", "a b c"),
        ]);
        (table, subsample)
    }

    #[test]
    fn test_cap_returns_pre_update_estimate() {
        let (table, subsample) = shifting_table();
        let mut rng = StdRng::seed_from_u64(5);

        let outcome = run(&table, &subsample, 1, &mut rng).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);

        let unweighted = weighted_majority(&table, &subsample, &BTreeMap::new(), &mut rng).unwrap();
        assert_eq!(outcome.estimate, unweighted);
        assert_eq!(outcome.estimate["t3"], Label::Negative);
        assert_eq!(outcome.estimate["t4"], Label::Negative);

        // A fresh pass on the fitted weights would already disagree.
        let weights = update_weights(&table, &subsample, &outcome.estimate).unwrap();
        let refitted = weighted_majority(&table, &subsample, &weights, &mut rng).unwrap();
        assert_eq!(refitted["t3"], Label::Positive);
        assert_eq!(refitted["t4"], Label::Positive);
        assert_ne!(outcome.estimate, refitted);
    }

    #[test]
    fn test_cap_keeps_last_fitted_estimate() {
        let (table, subsample) = shifting_table();

        let outcome = run(&table, &subsample, 2, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.estimate.values().all(|l| *l == Label::Positive));

        let outcome = run(&table, &subsample, 3, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.estimate.values().all(|l| *l == Label::Positive));
    }

    #[test]
    fn test_empty_subsample_is_rejected() {
        let err = run(&LabelTable::new(), &Subsample::new(), MAX_ITERATIONS, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err, AggregationError::EmptySubsample);
    }
}
