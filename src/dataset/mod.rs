//! Label table ingestion and the shared dataset model.
//!
//! A dataset is one canonical relation of (worker, task, label, truth)
//! records plus two indices derived from it once at load time: labels by
//! worker and labels by task. Neither index is mutable after construction,
//! so the two views cannot drift apart.

use crate::errors::DatasetError;
use crate::models::{DatasetStats, Label, TaskId, WorkerId};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Header names of the required input columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub worker: String,
    pub task: String,
    pub label: String,
    pub truth: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            worker: "!amt_worker_ids".to_string(),
            task: "orig_id".to_string(),
            label: "response".to_string(),
            truth: "gold".to_string(),
        }
    }
}

impl From<&crate::config::DatasetConfig> for ColumnNames {
    fn from(config: &crate::config::DatasetConfig) -> Self {
        Self {
            worker: config.worker_column.clone(),
            task: config.task_column.clone(),
            label: config.label_column.clone(),
            truth: config.truth_column.clone(),
        }
    }
}

/// One row of the canonical relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub worker: WorkerId,
    pub task: TaskId,
    pub label: Label,
    pub truth: Label,
}

/// Ground truth and submitted labels for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub truth: Label,
    pub labels: BTreeMap<WorkerId, Label>,
}

/// Labels indexed by worker, then by task.
///
/// This is the table every aggregator reads. Besides the real dataset's
/// index it also holds the dense synthetic table built by extrapolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    by_worker: BTreeMap<WorkerId, BTreeMap<TaskId, Label>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` for (worker, task), replacing any earlier value.
    pub fn insert(&mut self, worker: &str, task: &str, label: Label) {
        self.by_worker
            .entry(worker.to_string())
            .or_default()
            .insert(task.to_string(), label);
    }

    /// Label `worker` gave `task`, if any.
    pub fn get(&self, worker: &str, task: &str) -> Option<Label> {
        self.by_worker.get(worker)?.get(task).copied()
    }

    /// All labels submitted by `worker`.
    pub fn worker(&self, worker: &str) -> Option<&BTreeMap<TaskId, Label>> {
        self.by_worker.get(worker)
    }

    /// Iterate workers in key order.
    pub fn workers(&self) -> impl Iterator<Item = (&WorkerId, &BTreeMap<TaskId, Label>)> {
        self.by_worker.iter()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.by_worker.keys().cloned().collect()
    }

    pub fn worker_count(&self) -> usize {
        self.by_worker.len()
    }

    /// Total number of (worker, task) labels.
    pub fn label_count(&self) -> usize {
        self.by_worker.values().map(BTreeMap::len).sum()
    }
}

/// Read-only dataset shared by the sampler, aggregators and harness.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<LabelRecord>,
    by_worker: LabelTable,
    by_task: BTreeMap<TaskId, TaskEntry>,
}

impl Dataset {
    /// Load a tab-separated label table from disk.
    pub fn load(path: &Path, columns: &ColumnNames) -> Result<Self, DatasetError> {
        info!("Loading label table from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let dataset = Self::parse(&content, columns)?;
        let stats = dataset.stats();
        info!(
            "Loaded {} labels: {} tasks, {} workers",
            stats.records, stats.tasks, stats.workers
        );

        Ok(dataset)
    }

    /// Parse tab-separated content. The first line is the header.
    pub fn parse(content: &str, columns: &ColumnNames) -> Result<Self, DatasetError> {
        let mut lines = content.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((_, line)) => break line,
                None => return Err(DatasetError::EmptyInput),
            }
        };

        let names: Vec<&str> = header.trim_end_matches('\r').split('\t').map(str::trim).collect();
        let position = |name: &str| {
            names
                .iter()
                .position(|n| *n == name)
                .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
        };

        let worker_idx = position(&columns.worker)?;
        let task_idx = position(&columns.task)?;
        let label_idx = position(&columns.label)?;
        let truth_idx = position(&columns.truth)?;
        let required = 1 + worker_idx.max(task_idx).max(label_idx).max(truth_idx);

        debug!(
            "Column positions: worker={} task={} label={} truth={}",
            worker_idx, task_idx, label_idx, truth_idx
        );

        let mut records = Vec::new();

        for (idx, line) in lines {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
            if fields.len() < required {
                return Err(DatasetError::ShortRow {
                    line: line_no,
                    expected: required,
                    found: fields.len(),
                });
            }

            records.push(LabelRecord {
                worker: fields[worker_idx].trim().to_string(),
                task: fields[task_idx].trim().to_string(),
                label: parse_label(fields[label_idx], &columns.label, line_no)?,
                truth: parse_label(fields[truth_idx], &columns.truth, line_no)?,
            });
        }

        if records.is_empty() {
            return Err(DatasetError::NoRecords);
        }

        Ok(Self::from_records(records))
    }

    /// Build both indices from the canonical relation.
    ///
    /// The first ground truth seen for a task wins. A repeated
    /// (worker, task) pair keeps its last label.
    pub fn from_records(records: Vec<LabelRecord>) -> Self {
        let mut by_worker = LabelTable::new();
        let mut by_task: BTreeMap<TaskId, TaskEntry> = BTreeMap::new();

        for record in &records {
            by_worker.insert(&record.worker, &record.task, record.label);

            let entry = by_task
                .entry(record.task.clone())
                .or_insert_with(|| TaskEntry {
                    truth: record.truth,
                    labels: BTreeMap::new(),
                });

            if entry.truth != record.truth {
                warn!(
                    "Task {} has conflicting ground truth ({} vs {}), keeping {}",
                    record.task, entry.truth, record.truth, entry.truth
                );
            }

            if entry
                .labels
                .insert(record.worker.clone(), record.label)
                .is_some()
            {
                warn!(
                    "Worker {} labeled task {} more than once, keeping the last label",
                    record.worker, record.task
                );
            }
        }

        Self {
            records,
            by_worker,
            by_task,
        }
    }

    /// Labels indexed by worker.
    pub fn labels(&self) -> &LabelTable {
        &self.by_worker
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&TaskId, &TaskEntry)> {
        self.by_task.iter()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.by_task.keys().cloned().collect()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.by_worker.worker_ids()
    }

    /// Workers who labeled `task`, in key order.
    pub fn workers_for_task(&self, task: &str) -> Option<Vec<&WorkerId>> {
        self.by_task.get(task).map(|e| e.labels.keys().collect())
    }

    pub fn truth(&self, task: &str) -> Option<Label> {
        self.by_task.get(task).map(|e| e.truth)
    }

    /// Ground truth for every task.
    pub fn ground_truth(&self) -> BTreeMap<TaskId, Label> {
        self.by_task
            .iter()
            .map(|(id, entry)| (id.clone(), entry.truth))
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.by_task.len()
    }

    pub fn worker_count(&self) -> usize {
        self.by_worker.worker_count()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Fewest labelers on any task; this bounds real subsample sizes.
    pub fn min_labelers_per_task(&self) -> usize {
        self.by_task
            .values()
            .map(|e| e.labels.len())
            .min()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DatasetStats {
        let positives = self
            .by_task
            .values()
            .filter(|e| e.truth == Label::Positive)
            .count();

        DatasetStats {
            tasks: self.task_count(),
            workers: self.worker_count(),
            records: self.record_count(),
            min_labelers_per_task: self.min_labelers_per_task(),
            max_labelers_per_task: self
                .by_task
                .values()
                .map(|e| e.labels.len())
                .max()
                .unwrap_or(0),
            positive_share: if self.by_task.is_empty() {
                0.0
            } else {
                positives as f64 / self.by_task.len() as f64
            },
        }
    }
}

fn parse_label(field: &str, column: &str, line: usize) -> Result<Label, DatasetError> {
    let raw: i64 = field
        .trim()
        .parse()
        .map_err(|_| DatasetError::InvalidInteger {
            line,
            column: column.to_string(),
            value: field.trim().to_string(),
        })?;

    Label::from_raw(raw).ok_or_else(|| DatasetError::InvalidLabel {
        line,
        column: column.to_string(),
        value: raw,
    })
}

/// Synthetic datasets for unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    pub fn worker_name(i: usize) -> String {
        format!("W{:03}", i)
    }

    pub fn task_name(i: usize) -> String {
        format!("T{:04}", i)
    }

    /// `tasks` tasks, each labeled by `per_task` consecutive workers out of a
    /// pool of `workers`. Worker `i` answers correctly with probability
    /// between 0.55 and 0.95.
    pub fn synthetic(tasks: usize, workers: usize, per_task: usize, seed: u64) -> Dataset {
        assert!(per_task <= workers);
        let mut rng = StdRng::seed_from_u64(seed);
        let accuracy: Vec<f64> = (0..workers)
            .map(|i| 0.55 + 0.4 * (i % 9) as f64 / 8.0)
            .collect();

        let mut records = Vec::with_capacity(tasks * per_task);
        for t in 0..tasks {
            let truth = if rng.gen_bool(0.5) {
                Label::Positive
            } else {
                Label::Negative
            };
            for j in 0..per_task {
                let w = (t * per_task + j) % workers;
                let label = if rng.gen_bool(accuracy[w]) {
                    truth
                } else {
                    truth.flipped()
                };
                records.push(LabelRecord {
                    worker: worker_name(w),
                    task: task_name(t),
                    label,
                    truth,
                });
            }
        }

        Dataset::from_records(records)
    }

    /// Render a dataset back to the default TSV layout, with an extra
    /// ignored column.
    pub fn to_tsv(dataset: &Dataset) -> String {
        let mut out = String::from("!amt_annotation_ids\t!amt_worker_ids\torig_id\tresponse\tgold\n");
        for (i, r) in dataset.records.iter().enumerate() {
            let raw = |l: Label| if l == Label::Positive { 1 } else { 0 };
            out.push_str(&format!(
                "A{}\t{}\t{}\t{}\t{}\n",
                i,
                r.worker,
                r.task,
                raw(r.label),
                raw(r.truth)
            ));
        }
        out
    }
}
