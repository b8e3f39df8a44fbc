// Evaluation report for a held-out split

use crate::category::CategoryLabel;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: CategoryLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub samples: usize,
    /// Labels present in either truth or prediction, in enum order.
    pub per_class: Vec<ClassMetrics>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl EvaluationReport {
    pub fn compute(truth: &[CategoryLabel], predicted: &[CategoryLabel]) -> Self {
        let n = truth.len().min(predicted.len());
        let pairs = truth.iter().zip(predicted).take(n);

        let mut tp = [0usize; 6];
        let mut predicted_count = [0usize; 6];
        let mut support = [0usize; 6];
        let mut correct = 0;

        for (t, p) in pairs {
            support[t.index()] += 1;
            predicted_count[p.index()] += 1;
            if t == p {
                tp[t.index()] += 1;
                correct += 1;
            }
        }

        let per_class = CategoryLabel::ALL
            .iter()
            .filter(|label| support[label.index()] + predicted_count[label.index()] > 0)
            .map(|&label| {
                let i = label.index();
                let precision = ratio(tp[i], predicted_count[i]);
                let recall = ratio(tp[i], support[i]);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support: support[i],
                }
            })
            .collect();

        EvaluationReport {
            accuracy: ratio(correct, n),
            samples: n,
            per_class,
        }
    }

    pub fn class(&self, label: CategoryLabel) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.label == label)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<15} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:<15} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.label.as_str(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        write!(f, "{:<15} {:>29.2} {:>9}", "accuracy", self.accuracy, self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CategoryLabel::*;

    #[test]
    fn test_report_values() {
        let truth = [Lawyer, Lawyer, Individual, Individual];
        let predicted = [Lawyer, Individual, Individual, Individual];
        let report = EvaluationReport::compute(&truth, &predicted);

        assert_eq!(report.accuracy, 0.75);
        let lawyer = report.class(Lawyer).unwrap();
        assert_eq!(lawyer.precision, 1.0);
        assert_eq!(lawyer.recall, 0.5);
        assert_eq!(lawyer.support, 2);

        let individual = report.class(Individual).unwrap();
        assert!((individual.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(individual.recall, 1.0);
        assert!(report.class(Developer).is_none());
    }

    #[test]
    fn test_empty_report() {
        let report = EvaluationReport::compute(&[], &[]);
        assert_eq!(report.accuracy, 0.0);
        assert!(report.per_class.is_empty());
        assert!(report.to_string().contains("accuracy"));
    }
}
