//! Data models for label aggregation experiments.
//!
//! This module contains the core data structures shared by the sampler,
//! the aggregators, the evaluation harness and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a task (an item needing a binary label).
pub type TaskId = String;

/// Identifier of a worker (an entity providing labels).
pub type WorkerId = String;

/// Per-task restriction to a set of sampled labelers.
pub type Subsample = BTreeMap<TaskId, BTreeSet<WorkerId>>;

/// Per-task consensus produced by an aggregator.
pub type Aggregation = BTreeMap<TaskId, Verdict>;

/// A binary judgment, either from a worker or the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// Numeric value used in sums and matrices: -1 or +1.
    pub fn value(self) -> i32 {
        match self {
            Label::Negative => -1,
            Label::Positive => 1,
        }
    }

    /// Floating point view of [`Label::value`].
    pub fn as_f64(self) -> f64 {
        f64::from(self.value())
    }

    /// The opposite label.
    pub fn flipped(self) -> Self {
        match self {
            Label::Negative => Label::Positive,
            Label::Positive => Label::Negative,
        }
    }

    /// Decode a raw input value. `0` is treated as the negative class.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 | -1 => Some(Label::Negative),
            1 => Some(Label::Positive),
            _ => None,
        }
    }

    /// Sign of `x` as a label, `None` for exact zero.
    pub fn from_sign(x: f64) -> Option<Self> {
        if x > 0.0 {
            Some(Label::Positive)
        } else if x < 0.0 {
            Some(Label::Negative)
        } else {
            None
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Negative => write!(f, "-1"),
            Label::Positive => write!(f, "+1"),
        }
    }
}

/// An aggregator's decision for one task.
///
/// Only majority vote ever yields [`Verdict::Tie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Decided(Label),
    Tie,
}

impl Verdict {
    /// Numeric value: -1, 0 (tie) or +1.
    pub fn value(self) -> i32 {
        match self {
            Verdict::Decided(label) => label.value(),
            Verdict::Tie => 0,
        }
    }
}

impl From<Label> for Verdict {
    fn from(label: Label) -> Self {
        Verdict::Decided(label)
    }
}

/// Aggregation strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Method {
    /// Unweighted sign of the label sum
    #[serde(rename = "majority")]
    #[value(name = "majority", alias = "mv")]
    MajorityVote,
    /// Iteratively re-weighted voting
    #[serde(rename = "em")]
    #[value(name = "em")]
    EstimationMaximization,
    /// Top eigenvector of the task similarity matrix
    #[serde(rename = "svd", alias = "spectral")]
    #[value(name = "svd", alias = "spectral")]
    Spectral,
}

impl Method {
    /// Every strategy, in report order.
    pub const ALL: [Method; 3] = [
        Method::MajorityVote,
        Method::EstimationMaximization,
        Method::Spectral,
    ];
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::MajorityVote => write!(f, "Majority Vote"),
            Method::EstimationMaximization => write!(f, "Estimation Maximization"),
            Method::Spectral => write!(f, "SVD"),
        }
    }
}

/// Error rates of repeated trials for one (method, size) cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Per-trial error rates, in trial order.
    pub trials: Vec<f64>,
    /// Arithmetic mean of `trials`.
    pub mean: f64,
    /// Smallest trial error.
    pub min: f64,
    /// Largest trial error.
    pub max: f64,
    /// Population standard deviation of `trials`.
    pub std_dev: f64,
}

impl ErrorStats {
    /// Summarize a list of trial errors.
    pub fn from_trials(trials: Vec<f64>) -> Self {
        if trials.is_empty() {
            return Self::default();
        }

        let n = trials.len() as f64;
        let mean = trials.iter().sum::<f64>() / n;
        let min = trials.iter().copied().fold(f64::INFINITY, f64::min);
        let max = trials.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = trials.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;

        Self {
            trials,
            mean,
            min,
            max,
            std_dev: variance.sqrt(),
        }
    }
}

/// All sizes evaluated for one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSeries {
    pub method: Method,
    pub by_size: BTreeMap<usize, ErrorStats>,
}

impl MethodSeries {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            by_size: BTreeMap::new(),
        }
    }

    /// Mean error at `size`, if that size was run.
    pub fn mean_at(&self, size: usize) -> Option<f64> {
        self.by_size.get(&size).map(|s| s.mean)
    }
}

/// Shape of a loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub tasks: usize,
    pub workers: usize,
    pub records: usize,
    pub min_labelers_per_task: usize,
    pub max_labelers_per_task: usize,
    /// Share of tasks whose ground truth is positive.
    pub positive_share: f64,
}

/// Metadata about an experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the ingested label table.
    pub input: String,
    /// Date and time of the run.
    pub run_date: DateTime<Utc>,
    /// Base seed every trial seed was derived from.
    pub seed: u64,
    /// Trials per (method, size).
    pub repetitions: usize,
    /// Shape of the ingested dataset.
    pub dataset: DatasetStats,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
}

/// The complete experiment report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub metadata: ReportMetadata,
    /// Results on subsamples of the real data, one series per method.
    pub real: Vec<MethodSeries>,
    /// Spectral results on the extrapolated dataset, if that phase ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extrapolated: Option<MethodSeries>,
}

impl ExperimentReport {
    /// Method with the lowest mean error at `size` on real data.
    ///
    /// Ties keep the method listed first.
    pub fn best_method_at(&self, size: usize) -> Option<(Method, f64)> {
        let mut best: Option<(Method, f64)> = None;
        for series in &self.real {
            if let Some(mean) = series.mean_at(size) {
                match best {
                    Some((_, current)) if current <= mean => {}
                    _ => best = Some((series.method, mean)),
                }
            }
        }
        best
    }

    /// Every size that appears in any real-data series, ascending.
    pub fn real_sizes(&self) -> Vec<usize> {
        let sizes: BTreeSet<usize> = self
            .real
            .iter()
            .flat_map(|s| s.by_size.keys().copied())
            .collect();
        sizes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_raw() {
        assert_eq!(Label::from_raw(0), Some(Label::Negative));
        assert_eq!(Label::from_raw(-1), Some(Label::Negative));
        assert_eq!(Label::from_raw(1), Some(Label::Positive));
        assert_eq!(Label::from_raw(2), None);
    }

    #[test]
    fn test_label_values() {
        assert_eq!(Label::Positive.value(), 1);
        assert_eq!(Label::Negative.value(), -1);
        assert_eq!(Label::Positive.flipped(), Label::Negative);
        assert_eq!(Label::from_sign(0.0), None);
        assert_eq!(Label::from_sign(-0.3), Some(Label::Negative));
    }

    #[test]
    fn test_verdict_values() {
        assert_eq!(Verdict::Tie.value(), 0);
        assert_eq!(Verdict::from(Label::Negative).value(), -1);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::MajorityVote.to_string(), "Majority Vote");
        assert_eq!(Method::EstimationMaximization.to_string(), "Estimation Maximization");
        assert_eq!(Method::Spectral.to_string(), "SVD");
    }

    #[test]
    fn test_error_stats() {
        let stats = ErrorStats::from_trials(vec![0.1, 0.3, 0.2, 0.2]);
        assert!((stats.mean - 0.2).abs() < 1e-12);
        assert_eq!(stats.min, 0.1);
        assert_eq!(stats.max, 0.3);
        assert!((stats.std_dev - (0.005f64).sqrt()).abs() < 1e-12);

        let empty = ErrorStats::from_trials(Vec::new());
        assert_eq!(empty.mean, 0.0);
        assert!(empty.trials.is_empty());
    }

    #[test]
    fn test_best_method_at() {
        let mut mv = MethodSeries::new(Method::MajorityVote);
        mv.by_size.insert(3, ErrorStats::from_trials(vec![0.2]));
        let mut em = MethodSeries::new(Method::EstimationMaximization);
        em.by_size.insert(3, ErrorStats::from_trials(vec![0.1]));
        em.by_size.insert(5, ErrorStats::from_trials(vec![0.05]));

        let report = ExperimentReport {
            metadata: ReportMetadata {
                input: "rte.tsv".to_string(),
                run_date: Utc::now(),
                seed: 7,
                repetitions: 1,
                dataset: DatasetStats::default(),
                duration_seconds: 0.0,
            },
            real: vec![mv, em],
            extrapolated: None,
        };

        assert_eq!(
            report.best_method_at(3),
            Some((Method::EstimationMaximization, 0.1))
        );
        assert_eq!(report.real_sizes(), vec![3, 5]);
        assert_eq!(report.best_method_at(4), None);
    }
}
