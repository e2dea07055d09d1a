//! Unweighted majority vote.

use super::label_of;
use crate::dataset::LabelTable;
use crate::errors::AggregationError;
use crate::models::{Aggregation, Label, Subsample, Verdict};

/// Sign of the summed labels per task; an exact balance is a [`Verdict::Tie`].
pub fn aggregate(table: &LabelTable, subsample: &Subsample) -> Result<Aggregation, AggregationError> {
    let mut aggregation = Aggregation::new();

    for (task, workers) in subsample {
        let mut sum = 0i64;
        for worker in workers {
            sum += i64::from(label_of(table, worker, task)?.value());
        }

        let verdict = match sum {
            s if s > 0 => Verdict::Decided(Label::Positive),
            s if s < 0 => Verdict::Decided(Label::Negative),
            _ => Verdict::Tie,
        };
        aggregation.insert(task.clone(), verdict);
    }

    Ok(aggregation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::test_support::{subsample_of, table_of};
    use proptest::prelude::*;

    #[test]
    fn test_majority_vote() {
        let table = table_of(&[
            ("a", "t1", 1),
            ("b", "t1", 1),
            ("c", "t1", -1),
            ("a", "t2", -1),
            ("b", "t2", 1),
            ("c", "t3", -1),
        ]);
        let subsample = subsample_of(&[("t1", "a b c"), ("t2", "a b"), ("t3", "c")]);

        let result = aggregate(&table, &subsample).unwrap();
        assert_eq!(result["t1"], Verdict::Decided(Label::Positive));
        assert_eq!(result["t2"], Verdict::Tie);
        assert_eq!(result["t3"], Verdict::Decided(Label::Negative));
    }

    #[test]
    fn test_missing_label() {
        let table = table_of(&[("a", "t1", 1)]);
        let subsample = subsample_of(&[("t1", "a b")]);

        let err = aggregate(&table, &subsample).unwrap_err();
        assert_eq!(
            err,
            AggregationError::MissingLabel {
                worker: "b".to_string(),
                task: "t1".to_string()
            }
        );
    }

    #[test]
    fn test_empty_subsample() {
        let result = aggregate(&LabelTable::new(), &Subsample::new()).unwrap();
        assert!(result.is_empty());
    }

    proptest! {
        #[test]
        fn prop_order_independent(labels in proptest::collection::vec(prop::bool::ANY, 1..15)) {
            let value = |b: bool| if b { 1 } else { -1 };
            let forward: Vec<(String, i32)> = labels
                .iter()
                .enumerate()
                .map(|(i, b)| (format!("w{:02}", i), value(*b)))
                .collect();
            let reversed: Vec<(String, i32)> = labels
                .iter()
                .rev()
                .enumerate()
                .map(|(i, b)| (format!("w{:02}", i), value(*b)))
                .collect();

            let sum: i32 = forward.iter().map(|(_, v)| v).sum();
            let expected = match sum {
                s if s > 0 => 1,
                s if s < 0 => -1,
                _ => 0,
            };

            for rows in [forward, reversed] {
                let triples: Vec<(&str, &str, i32)> =
                    rows.iter().map(|(w, v)| (w.as_str(), "t", *v)).collect();
                let names: Vec<&str> = rows.iter().map(|(w, _)| w.as_str()).collect();
                let table = table_of(&triples);
                let subsample = subsample_of(&[("t", names.join(" ").as_str())]);

                let verdict = aggregate(&table, &subsample).unwrap()["t"];
                prop_assert_eq!(verdict.value(), expected);
                prop_assert!([-1, 0, 1].contains(&verdict.value()));
            }
        }
    }
}
