//! Markdown report generation.
//!
//! This module renders experiment results as Markdown tables, or as
//! pretty-printed JSON.

use crate::models::{DatasetStats, ErrorStats, ExperimentReport, MethodSeries, ReportMetadata};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ExperimentReport, include_trials: bool) -> String {
    let mut output = String::new();

    output.push_str("# Label Aggregation Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_dataset_section(&report.metadata.dataset));
    output.push_str(&generate_real_section(report));

    if include_trials {
        output.push_str(&generate_trials_section(&report.real));
    }

    if let Some(ref series) = report.extrapolated {
        output.push_str(&generate_extrapolated_section(series, include_trials));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input));
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Seed:** {}\n", metadata.seed));
    section.push_str(&format!("- **Repetitions:** {}\n", metadata.repetitions));
    section.push_str(&format!("- **Duration:** {:.1}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

/// Generate the dataset summary.
fn generate_dataset_section(stats: &DatasetStats) -> String {
    let mut section = String::new();

    section.push_str("## Dataset\n\n");
    section.push_str("| Tasks | Workers | Labels | Labelers per Task | Positive Gold |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");

    let per_task = if stats.min_labelers_per_task == stats.max_labelers_per_task {
        stats.min_labelers_per_task.to_string()
    } else {
        format!("{}-{}", stats.min_labelers_per_task, stats.max_labelers_per_task)
    };

    section.push_str(&format!(
        "| {} | {} | {} | {} | {:.1}% |\n\n",
        stats.tasks,
        stats.workers,
        stats.records,
        per_task,
        stats.positive_share * 100.0
    ));

    section
}

/// Average error per size and method, with the winner of each row.
fn generate_real_section(report: &ExperimentReport) -> String {
    let mut section = String::new();

    section.push_str("## Average Error on Real Data\n\n");

    if report.real.is_empty() {
        section.push_str("No methods were run.\n\n");
        return section;
    }

    section.push_str("| Labelers |");
    for series in &report.real {
        section.push_str(&format!(" {} |", series.method));
    }
    section.push_str(" Best |\n");

    section.push_str("|:---:|");
    for _ in &report.real {
        section.push_str(":---:|");
    }
    section.push_str(":---|\n");

    for size in report.real_sizes() {
        section.push_str(&format!("| {} |", size));
        for series in &report.real {
            match series.by_size.get(&size) {
                Some(stats) => section.push_str(&format!(" {} |", format_cell(stats))),
                None => section.push_str(" - |"),
            }
        }
        match report.best_method_at(size) {
            Some((method, _)) => section.push_str(&format!(" {} |\n", method)),
            None => section.push_str(" - |\n"),
        }
    }
    section.push('\n');
    section.push_str("*Cells show mean error ± standard deviation over all trials. A tie costs 0.5.*\n\n");

    section
}

/// Per-trial error lists, one subsection per method.
fn generate_trials_section(real: &[MethodSeries]) -> String {
    let mut section = String::new();

    section.push_str("## Trial Errors\n\n");

    for series in real {
        section.push_str(&format!("### {}\n\n", series.method));
        section.push_str(&format_trial_list(series));
    }

    section
}

/// Spectral results on the densified table.
fn generate_extrapolated_section(series: &MethodSeries, include_trials: bool) -> String {
    let mut section = String::new();

    section.push_str("## Extrapolated Dataset\n\n");
    section.push_str(
        "Every worker is given a label on every task, drawn to match their observed accuracy. \
         Results use the SVD method.\n\n",
    );

    if series.by_size.is_empty() {
        section.push_str("No extrapolated sizes were run.\n\n");
        return section;
    }

    section.push_str("| Labelers | Mean Error | Min | Max |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    for (size, stats) in &series.by_size {
        section.push_str(&format!(
            "| {} | {} | {:.4} | {:.4} |\n",
            size,
            format_cell(stats),
            stats.min,
            stats.max
        ));
    }
    section.push('\n');

    if include_trials {
        section.push_str("### Trial Errors\n\n");
        section.push_str(&format_trial_list(series));
    }

    section
}

fn format_cell(stats: &ErrorStats) -> String {
    format!("{:.4} ± {:.4}", stats.mean, stats.std_dev)
}

fn format_trial_list(series: &MethodSeries) -> String {
    let mut list = String::new();

    for (size, stats) in &series.by_size {
        let errors: Vec<String> = stats.trials.iter().map(|e| format!("{:.4}", e)).collect();
        list.push_str(&format!("- **{}:** {}\n", size, errors.join(", ")));
    }
    list.push('\n');

    list
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by crowdagg v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ExperimentReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;
    use chrono::Utc;

    fn create_test_report() -> ExperimentReport {
        let metadata = ReportMetadata {
            input: "data/rte.standardized.tsv".to_string(),
            run_date: Utc::now(),
            seed: 42,
            repetitions: 2,
            dataset: DatasetStats {
                tasks: 800,
                workers: 164,
                records: 8000,
                min_labelers_per_task: 10,
                max_labelers_per_task: 10,
                positive_share: 0.5,
            },
            duration_seconds: 12.5,
        };

        let mut majority = MethodSeries::new(Method::MajorityVote);
        majority.by_size.insert(1, ErrorStats::from_trials(vec![0.18, 0.16]));
        majority.by_size.insert(3, ErrorStats::from_trials(vec![0.12, 0.10]));
        let mut spectral = MethodSeries::new(Method::Spectral);
        spectral.by_size.insert(1, ErrorStats::from_trials(vec![0.17, 0.19]));
        spectral.by_size.insert(3, ErrorStats::from_trials(vec![0.09, 0.08]));

        let mut extrapolated = MethodSeries::new(Method::Spectral);
        extrapolated.by_size.insert(20, ErrorStats::from_trials(vec![0.05, 0.07]));

        ExperimentReport {
            metadata,
            real: vec![majority, spectral],
            extrapolated: Some(extrapolated),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, true);

        assert!(markdown.contains("# Label Aggregation Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Dataset"));
        assert!(markdown.contains("## Average Error on Real Data"));
        assert!(markdown.contains("| Labelers | Majority Vote | SVD | Best |"));
        assert!(markdown.contains("| 3 | 0.1100 ± 0.0100 | 0.0850 ± 0.0050 | SVD |"));
        assert!(markdown.contains("## Trial Errors"));
        assert!(markdown.contains("- **1:** 0.1800, 0.1600"));
        assert!(markdown.contains("## Extrapolated Dataset"));
        assert!(markdown.contains("| 20 | 0.0600 ± 0.0100 | 0.0500 | 0.0700 |"));
    }

    #[test]
    fn test_markdown_without_trials() {
        let mut report = create_test_report();
        report.extrapolated = None;
        let markdown = generate_markdown_report(&report, false);

        assert!(!markdown.contains("## Trial Errors"));
        assert!(!markdown.contains("## Extrapolated Dataset"));
        assert!(markdown.contains("| 1 | 0.1700 ± 0.0100 | 0.1800 ± 0.0100 | Majority Vote |"));
    }

    #[test]
    fn test_generate_dataset_section() {
        let mut stats = create_test_report().metadata.dataset;
        stats.min_labelers_per_task = 4;

        let section = generate_dataset_section(&stats);
        assert!(section.contains("| 800 | 164 | 8000 | 4-10 | 50.0% |"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let report = create_test_report();
        let section = generate_metadata_section(&report.metadata);

        assert!(section.contains("data/rte.standardized.tsv"));
        assert!(section.contains("**Seed:** 42"));
        assert!(section.contains("12.5s"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"by_size\""));
        assert!(json.contains("\"extrapolated\""));
        assert!(json.contains("\"svd\""));
    }
}
