//! Error types for ingestion, sampling, aggregation and scoring.
//!
//! Malformed input aborts ingestion. Everything else here is a
//! precondition violation: the caller asked for something the data
//! cannot support, and the run stops rather than producing degenerate
//! numbers.

use thiserror::Error;

/// Failures while reading a label table from disk.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input is empty (no header row)")]
    EmptyInput,

    #[error("Required column '{0}' not found in header")]
    MissingColumn(String),

    #[error("Line {line}: expected at least {expected} fields, found {found}")]
    ShortRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: column '{column}' is not an integer: '{value}'")]
    InvalidInteger {
        line: usize,
        column: String,
        value: String,
    },

    #[error("Line {line}: column '{column}' holds {value}, expected 0, 1 or -1")]
    InvalidLabel {
        line: usize,
        column: String,
        value: i64,
    },

    #[error("Input contains a header but no label rows")]
    NoRecords,
}

/// Failures while drawing a subsample.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("Task {task} has {available} labelers, cannot sample {requested}")]
    NotEnoughLabelers {
        task: String,
        requested: usize,
        available: usize,
    },

    #[error("Requested {requested} workers per task but only {available} workers exist")]
    SizeTooLarge { requested: usize, available: usize },

    #[error("Subsample size must be at least 1")]
    ZeroSize,
}

/// Failures inside an aggregator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Subsample contains no tasks")]
    EmptySubsample,

    #[error("No sampled worker agrees with ground truth on a strict majority of tasks")]
    NoGoodWorker,

    #[error("No label recorded for worker {worker} on task {task}")]
    MissingLabel { worker: String, task: String },

    #[error("No ground truth recorded for task {0}")]
    MissingTruth(String),

    #[error("Worker {0} has no labels in the table")]
    UnknownWorker(String),

    #[error("Eigen-decomposition did not converge for a {0}x{0} matrix")]
    EigenFailed(usize),
}

/// Failures while scoring an aggregation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Cannot score an empty aggregation")]
    Empty,

    #[error("Aggregated task {0} has no ground truth")]
    UnknownTask(String),
}

/// Any failure raised while running an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SampleError::NotEnoughLabelers {
            task: "t1".to_string(),
            requested: 11,
            available: 10,
        };
        assert_eq!(err.to_string(), "Task t1 has 10 labelers, cannot sample 11");

        let err = DatasetError::MissingColumn("gold".to_string());
        assert!(err.to_string().contains("'gold'"));
    }

    #[test]
    fn test_experiment_error_wraps_sources() {
        let err: ExperimentError = AggregationError::NoGoodWorker.into();
        assert!(matches!(
            err,
            ExperimentError::Aggregation(AggregationError::NoGoodWorker)
        ));
        assert_eq!(err.to_string(), AggregationError::NoGoodWorker.to_string());
    }
}
