//! Aggregation strategies.
//!
//! Each strategy maps a subsample of the label table to one verdict per
//! task. They share no state and are selected through [`Method`].

pub mod eigen;
pub mod em;
pub mod majority;
pub mod spectral;

use crate::dataset::LabelTable;
use crate::errors::AggregationError;
use crate::models::{Aggregation, Label, Method, Subsample, TaskId};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::trace;

/// Tunables shared by the strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSettings {
    /// Cap on EM weighted-majority passes.
    pub max_iterations: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            max_iterations: em::MAX_ITERATIONS,
        }
    }
}

impl From<&crate::config::AggregationConfig> for AggregationSettings {
    fn from(config: &crate::config::AggregationConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
        }
    }
}

impl Method {
    /// Aggregate `subsample` with this strategy.
    ///
    /// `truth` is only consulted by the spectral method, to pick the good
    /// worker that fixes the eigenvector sign.
    pub fn aggregate<R: Rng + ?Sized>(
        self,
        table: &LabelTable,
        truth: &BTreeMap<TaskId, Label>,
        subsample: &Subsample,
        settings: &AggregationSettings,
        rng: &mut R,
    ) -> Result<Aggregation, AggregationError> {
        match self {
            Method::MajorityVote => majority::aggregate(table, subsample),
            Method::EstimationMaximization => {
                let outcome = em::run(table, subsample, settings.max_iterations, rng)?;
                trace!(
                    iterations = outcome.iterations,
                    converged = outcome.converged,
                    "EM finished"
                );
                Ok(outcome.into_aggregation())
            }
            Method::Spectral => {
                let good_worker = spectral::find_good_worker(table, truth, subsample)?;
                spectral::aggregate(table, subsample, &good_worker, rng)
            }
        }
    }
}

/// Label `worker` gave `task`; absence means the subsample does not fit
/// the table.
pub(crate) fn label_of(table: &LabelTable, worker: &str, task: &str) -> Result<Label, AggregationError> {
    table
        .get(worker, task)
        .ok_or_else(|| AggregationError::MissingLabel {
            worker: worker.to_string(),
            task: task.to_string(),
        })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::synthetic;
    use crate::models::Verdict;
    use crate::sampler::Sampler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dispatch_covers_every_task() {
        let dataset = synthetic(40, 10, 6, 12);
        let sampler = Sampler::new(&dataset);
        let mut rng = StdRng::seed_from_u64(3);
        let subsample = sampler.subsample(4, &mut rng).unwrap();
        let truth = dataset.ground_truth();
        let settings = AggregationSettings::default();

        for method in Method::ALL {
            let result = method
                .aggregate(dataset.labels(), &truth, &subsample, &settings, &mut rng)
                .unwrap();
            assert_eq!(result.len(), 40, "{} skipped tasks", method);

            if method != Method::MajorityVote {
                assert!(result.values().all(|v| *v != Verdict::Tie));
            }
        }
    }

    #[test]
    fn test_majority_and_spectral_are_repeatable() {
        let dataset = synthetic(50, 12, 7, 2);
        let sampler = Sampler::new(&dataset);
        let subsample = sampler.subsample(5, &mut StdRng::seed_from_u64(1)).unwrap();
        let truth = dataset.ground_truth();
        let settings = AggregationSettings::default();

        for method in [Method::MajorityVote, Method::Spectral] {
            let first = method
                .aggregate(dataset.labels(), &truth, &subsample, &settings, &mut StdRng::seed_from_u64(10))
                .unwrap();
            let second = method
                .aggregate(dataset.labels(), &truth, &subsample, &settings, &mut StdRng::seed_from_u64(20))
                .unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_default_settings() {
        assert_eq!(AggregationSettings::default().max_iterations, 20);
    }
}
