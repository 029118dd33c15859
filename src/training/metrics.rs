//! Evaluation metrics on the held-out split.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// True occurrences in the test split
    pub support: usize,
}

/// Rows are true classes, columns predicted classes, both in `labels` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub per_class: BTreeMap<String, ClassMetrics>,
    pub confusion: ConfusionMatrix,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Score `predicted` against `truth` over `labels`.
///
/// Labels outside `labels` are ignored for the matrix but still count as
/// wrong for accuracy.
pub fn evaluate(labels: &[String], truth: &[String], predicted: &[String]) -> ClassificationReport {
    let index: BTreeMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    let k = labels.len();
    let mut counts = vec![vec![0_usize; k]; k];
    let mut correct = 0_usize;
    for (t, p) in truth.iter().zip(predicted) {
        if t == p {
            correct += 1;
        }
        if let (Some(&ti), Some(&pi)) = (index.get(t.as_str()), index.get(p.as_str())) {
            counts[ti][pi] += 1;
        }
    }

    let per_class = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let tp = counts[i][i];
            let predicted_as: usize = counts.iter().map(|row| row[i]).sum();
            let support: usize = counts[i].iter().sum();
            let precision = ratio(tp, predicted_as);
            let recall = ratio(tp, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            (
                label.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                },
            )
        })
        .collect();

    ClassificationReport {
        accuracy: ratio(correct, truth.len().min(predicted.len())),
        per_class,
        confusion: ConfusionMatrix {
            labels: labels.to_vec(),
            counts,
        },
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .keys()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0)
            .max(8);

        writeln!(f, "Accuracy: {:.2}", self.accuracy)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>6}  {:>8}  {:>7}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (label, m) in &self.per_class {
            writeln!(
                f,
                "{label:>width$}  {:>9.2}  {:>6.2}  {:>8.2}  {:>7}",
                m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = true, columns = predicted):")?;
        write!(f, "{:>width$}", "")?;
        for label in &self.confusion.labels {
            write!(f, "  {label:>width$}")?;
        }
        writeln!(f)?;
        for (label, row) in self.confusion.labels.iter().zip(&self.confusion.counts) {
            write!(f, "{label:>width$}")?;
            for c in row {
                write!(f, "  {c:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_metrics_match_hand_computation() {
        let labels = s(&["A", "B"]);
        let truth = s(&["A", "A", "A", "B"]);
        let pred = s(&["A", "A", "B", "B"]);
        let report = evaluate(&labels, &truth, &pred);

        assert!((report.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(report.confusion.counts, vec![vec![2, 1], vec![0, 1]]);

        let a = report.per_class["A"];
        assert!((a.precision - 1.0).abs() < 1e-12);
        assert!((a.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((a.f1 - 0.8).abs() < 1e-12);
        assert_eq!(a.support, 3);

        let b = report.per_class["B"];
        assert!((b.precision - 0.5).abs() < 1e-12);
        assert!((b.recall - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_predicted_class_has_zero_precision() {
        let labels = s(&["A", "B"]);
        let report = evaluate(&labels, &s(&["B"]), &s(&["A"]));
        assert_eq!(report.per_class["B"].precision, 0.0);
        assert_eq!(report.per_class["B"].f1, 0.0);
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn test_display_lists_every_class() {
        let labels = s(&["Etanol", "Metanol"]);
        let report = evaluate(&labels, &labels, &labels);
        let text = report.to_string();
        assert!(text.contains("Accuracy: 1.00"));
        assert!(text.contains("Etanol"));
        assert!(text.contains("Metanol"));
    }
}
