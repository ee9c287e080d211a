//! Agreement metrics over class indices

use crate::error::{AnalysisError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Counts of (predicted, actual) pairs, indexed `[predicted][actual]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn from_labels(predicted: &[usize], actual: &[usize], n_classes: usize) -> Result<Self> {
        if predicted.len() != actual.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} predictions", actual.len()),
                actual: format!("{} predictions", predicted.len()),
            });
        }
        let mut counts = Array2::<usize>::zeros((n_classes, n_classes));
        for (&p, &a) in predicted.iter().zip(actual) {
            if p >= n_classes || a >= n_classes {
                return Err(AnalysisError::InvalidParameter {
                    name: "label".to_string(),
                    value: p.max(a).to_string(),
                    reason: format!("class index outside 0..{}", n_classes),
                });
            }
            counts[[p, a]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn get(&self, predicted: usize, actual: usize) -> usize {
        self.counts[[predicted, actual]]
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn correct(&self) -> usize {
        self.counts.diag().sum()
    }

    /// Rows of each actual class (column sums)
    pub fn actual_totals(&self) -> Vec<usize> {
        self.counts.sum_axis(Axis(0)).to_vec()
    }

    /// Rows assigned to each class (row sums)
    pub fn predicted_totals(&self) -> Vec<usize> {
        self.counts.sum_axis(Axis(1)).to_vec()
    }

    /// Fraction on the diagonal; zero for an empty matrix
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Cohen's kappa, (p0 - pe) / (1 - pe). When chance agreement is
    /// already perfect the ratio is undefined; that case scores 1.0 if the
    /// observed agreement is also perfect and 0.0 otherwise.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let p0 = self.correct() as f64 / n;
        let pe: f64 = self
            .predicted_totals()
            .iter()
            .zip(self.actual_totals())
            .map(|(&r, c)| (r as f64 / n) * (c as f64 / n))
            .sum();

        if (1.0 - pe).abs() < 1e-12 {
            if (p0 - 1.0).abs() < 1e-12 {
                1.0
            } else {
                0.0
            }
        } else {
            (p0 - pe) / (1.0 - pe)
        }
    }

    /// Recall of `class`; `None` when the class has no actual rows
    pub fn recall(&self, class: usize) -> Option<f64> {
        let support: usize = self.counts.column(class).sum();
        (support > 0).then(|| self.counts[[class, class]] as f64 / support as f64)
    }

    /// Fixed-width text table with predicted rows and actual columns
    pub fn render(&self, labels: &[&str]) -> String {
        let width = labels.iter().map(|l| l.len()).max().unwrap_or(1).max(4) + 1;
        let mut out = format!("{:>width$}", "p\\a", width = width);
        for label in labels {
            out.push_str(&format!("{:>width$}", label, width = width));
        }
        out.push('\n');
        for (i, row) in self.counts.rows().into_iter().enumerate() {
            out.push_str(&format!("{:>width$}", labels.get(i).copied().unwrap_or("?"), width = width));
            for v in row {
                out.push_str(&format!("{:>width$}", v, width = width));
            }
            out.push('\n');
        }
        out
    }
}

/// Fraction of rows whose prediction is one of that row's credited classes
pub fn total_accuracy(predicted: &[usize], credited: &[Vec<usize>]) -> Result<f64> {
    if predicted.len() != credited.len() {
        return Err(AnalysisError::ShapeError {
            expected: format!("{} predictions", credited.len()),
            actual: format!("{} predictions", predicted.len()),
        });
    }
    if predicted.is_empty() {
        return Ok(0.0);
    }
    let hits = predicted
        .iter()
        .zip(credited)
        .filter(|(p, allowed)| allowed.contains(*p))
        .count();
    Ok(hits as f64 / predicted.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = vec![0, 1, 2, 2, 1];
        let cm = ConfusionMatrix::from_labels(&y, &y, 3).unwrap();
        assert_eq!(cm.accuracy(), 1.0);
        assert_eq!(cm.kappa(), 1.0);
    }

    #[test]
    fn test_kappa_zero_at_chance() {
        // Counts equal the product of the marginals
        let predicted = vec![0, 0, 1, 1];
        let actual = vec![0, 1, 0, 1];
        let cm = ConfusionMatrix::from_labels(&predicted, &actual, 2).unwrap();
        assert!((cm.accuracy() - 0.5).abs() < 1e-12);
        assert!(cm.kappa().abs() < 1e-12);
    }

    #[test]
    fn test_kappa_known_value() {
        // p0 = 0.7, pe = 0.5 * 0.6 + 0.5 * 0.4 = 0.5
        let predicted = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let actual = vec![0, 0, 0, 0, 1, 0, 0, 1, 1, 1];
        let cm = ConfusionMatrix::from_labels(&predicted, &actual, 2).unwrap();
        assert!((cm.kappa() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_chance_agreement() {
        let cm = ConfusionMatrix::from_labels(&[3, 3], &[3, 3], 4).unwrap();
        assert_eq!(cm.kappa(), 1.0);
    }

    #[test]
    fn test_layout_and_recall() {
        let cm = ConfusionMatrix::from_labels(&[1, 1, 0], &[0, 1, 0], 3).unwrap();
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(0, 1), 0);
        assert_eq!(cm.recall(0), Some(0.5));
        assert_eq!(cm.recall(1), Some(1.0));
        assert_eq!(cm.recall(2), None);
        assert_eq!(cm.actual_totals(), vec![2, 1, 0]);
        assert_eq!(cm.predicted_totals(), vec![1, 2, 0]);
    }

    #[test]
    fn test_total_accuracy_is_superset() {
        let predicted = vec![0, 2, 1];
        let credited = vec![vec![0], vec![1, 2], vec![3]];
        assert!((total_accuracy(&predicted, &credited).unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_render_has_header_and_rows() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 2).unwrap();
        let text = cm.render(&["GK", "CB"]);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().contains("CB"));
    }
}
