//! Scoring aggregations against ground truth, and the experiment harness.

pub mod harness;

pub use harness::{Experiment, ExperimentConfig};

use crate::errors::EvaluationError;
use crate::models::{Aggregation, Label, TaskId, Verdict};
use std::collections::BTreeMap;

/// Cost charged for a tie.
pub const TIE_COST: f64 = 0.5;

/// Average cost per scored task: 0 when right, 1 when wrong, 0.5 for a tie.
pub fn error_rate(
    aggregation: &Aggregation,
    truth: &BTreeMap<TaskId, Label>,
) -> Result<f64, EvaluationError> {
    if aggregation.is_empty() {
        return Err(EvaluationError::Empty);
    }

    let mut incorrect = 0.0;
    for (task, verdict) in aggregation {
        let expected = truth
            .get(task)
            .ok_or_else(|| EvaluationError::UnknownTask(task.clone()))?;

        match verdict {
            Verdict::Tie => incorrect += TIE_COST,
            Verdict::Decided(label) if label != expected => incorrect += 1.0,
            Verdict::Decided(_) => {}
        }
    }

    Ok(incorrect / aggregation.len() as f64)
}
