//! K-Nearest Neighbors classification
//!
//! Euclidean distance in a feature space standardised with training
//! statistics. [`KnnModel`] picks k by stratified cross-validation.

use super::cross_validation::StratifiedKFold;
use super::Classifier;
use crate::error::{AnalysisError, Result};
use crate::preprocessing::StandardScaler;
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// k-NN model selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Candidate neighbour counts
    pub k_candidates: Vec<usize>,
    /// Stratified folds used to compare candidates
    pub cv_folds: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k_candidates: vec![5, 7, 9],
            cv_folds: 10,
        }
    }
}

/// Max-heap entry ordered by (distance, training row)
#[derive(PartialEq)]
struct DistIdx(f64, usize);

impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| {
            let d = ai - bi;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// The k nearest training rows, nearest first. Equal distances keep the
/// lower training row.
fn find_k_nearest(point: ArrayView1<f64>, x_train: &Array2<f64>, k: usize) -> Vec<(f64, usize)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, row) in x_train.rows().into_iter().enumerate() {
        let entry = DistIdx(euclidean(point, row), i);
        if heap.len() < k {
            heap.push(entry);
        } else if heap.peek().map_or(false, |top| entry < *top) {
            heap.pop();
            heap.push(entry);
        }
    }
    heap.into_sorted_vec().into_iter().map(|d| (d.0, d.1)).collect()
}

/// Majority vote over neighbours sorted nearest first. A tie goes to the
/// tied class whose member is nearest.
fn vote_classify(neighbors: &[(f64, usize)], y_train: &[usize], n_classes: usize) -> usize {
    let mut votes = vec![0usize; n_classes];
    for &(_, idx) in neighbors {
        votes[y_train[idx]] += 1;
    }
    let top = votes.iter().copied().max().unwrap_or(0);
    neighbors
        .iter()
        .map(|&(_, idx)| y_train[idx])
        .find(|&class| votes[class] == top)
        .unwrap_or(0)
}

/// Plain k-NN classifier over whatever space it is given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub k: usize,
    x_train: Option<Array2<f64>>,
    y_train: Vec<usize>,
    n_classes: usize,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            x_train: None,
            y_train: Vec::new(),
            n_classes: 0,
        }
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(AnalysisError::DataError("k-NN needs at least one training row".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(AnalysisError::InvalidParameter {
                name: "y".to_string(),
                value: bad.to_string(),
                reason: format!("class index outside 0..{}", n_classes),
            });
        }
        self.x_train = Some(x.clone());
        self.y_train = y.to_vec();
        self.n_classes = n_classes;
        Ok(())
    }

    /// Predict class labels (parallelized over test samples)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let x_train = self.x_train.as_ref().ok_or(AnalysisError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let k = self.k.min(x_train.nrows());

        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, k);
                vote_classify(&neighbors, &self.y_train, self.n_classes)
            })
            .collect())
    }
}

/// Standardise, choose k by stratified CV, then fit on the full training set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnModel {
    pub config: KnnConfig,
    pub random_state: u64,
    scaler: Option<StandardScaler>,
    classifier: Option<KnnClassifier>,
    /// Mean CV accuracy per candidate k
    cv_scores: Vec<(usize, f64)>,
}

impl KnnModel {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            random_state: 42,
            scaler: None,
            classifier: None,
            cv_scores: Vec::new(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn candidates(&self) -> Result<Vec<usize>> {
        let mut ks: Vec<usize> = self.config.k_candidates.iter().copied().filter(|&k| k > 0).collect();
        ks.sort_unstable();
        ks.dedup();
        if ks.is_empty() {
            return Err(AnalysisError::InvalidParameter {
                name: "k_candidates".to_string(),
                value: format!("{:?}", self.config.k_candidates),
                reason: "need at least one positive k".to_string(),
            });
        }
        Ok(ks)
    }

    /// Mean held-out accuracy of every candidate. Each fold standardises
    /// with its own training rows.
    fn cross_validate(&self, x: &Array2<f64>, y: &[usize], n_classes: usize, ks: &[usize]) -> Result<Vec<(usize, f64)>> {
        let n_splits = self.config.cv_folds.min(x.nrows());
        let splits = StratifiedKFold::new(n_splits)
            .with_random_state(self.random_state)
            .split(y)?;

        let mut correct = vec![0usize; ks.len()];
        let mut total = 0usize;

        for split in &splits {
            let mut scaler = StandardScaler::new();
            let x_fit = scaler.fit_transform(&x.select(Axis(0), &split.train_indices))?;
            let x_held = scaler.transform(&x.select(Axis(0), &split.test_indices))?;
            let y_fit: Vec<usize> = split.train_indices.iter().map(|&i| y[i]).collect();
            let y_held: Vec<usize> = split.test_indices.iter().map(|&i| y[i]).collect();

            for (slot, &k) in ks.iter().enumerate() {
                let mut knn = KnnClassifier::new(k);
                knn.fit(&x_fit, &y_fit, n_classes)?;
                let pred = knn.predict(&x_held)?;
                correct[slot] += pred.iter().zip(&y_held).filter(|(p, a)| p == a).count();
            }
            total += y_held.len();
        }

        Ok(ks
            .iter()
            .zip(correct)
            .map(|(&k, c)| (k, c as f64 / total.max(1) as f64))
            .collect())
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        let ks = self.candidates()?;

        let k = if ks.len() == 1 {
            self.cv_scores.clear();
            ks[0]
        } else {
            self.cv_scores = self.cross_validate(x, y, n_classes, &ks)?;
            // Highest accuracy; ties keep the smaller k
            let mut best = self.cv_scores[0];
            for &(k, acc) in &self.cv_scores[1..] {
                if acc > best.1 {
                    best = (k, acc);
                }
            }
            debug!(k = best.0, cv_accuracy = best.1, "Selected k");
            best.0
        };

        let mut scaler = StandardScaler::new();
        let x_scaled = scaler.fit_transform(x)?;
        let mut classifier = KnnClassifier::new(k);
        classifier.fit(&x_scaled, y, n_classes)?;

        self.scaler = Some(scaler);
        self.classifier = Some(classifier);
        Ok(())
    }

    /// Scale with training statistics, then vote
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let (scaler, classifier) = match (&self.scaler, &self.classifier) {
            (Some(s), Some(c)) => (s, c),
            _ => return Err(AnalysisError::ModelNotFitted),
        };
        classifier.predict(&scaler.transform(x)?)
    }

    pub fn selected_k(&self) -> Option<usize> {
        self.classifier.as_ref().map(|c| c.k)
    }

    pub fn cv_scores(&self) -> &[(usize, f64)] {
        &self.cv_scores
    }
}

impl Classifier for KnnModel {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        KnnModel::fit(self, x, y, n_classes)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        KnnModel::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_classifier() {
        let x = array![[0.0, 0.0], [0.5, 0.0], [0.0, 0.5], [5.0, 5.0], [5.5, 5.0], [5.0, 5.5]];
        let y = vec![0, 0, 0, 2, 2, 2];
        let mut knn = KnnClassifier::new(3);
        knn.fit(&x, &y, 3).unwrap();

        let pred = knn.predict(&array![[0.2, 0.2], [5.2, 5.2]]).unwrap();
        assert_eq!(pred, vec![0, 2]);
    }

    #[test]
    fn test_vote_tie_goes_to_nearest_class() {
        let y_train = vec![1, 2, 2, 1];
        // Two votes each; class 2 owns the nearest neighbour
        let neighbors = vec![(0.1, 1), (0.2, 0), (0.3, 3), (0.4, 2)];
        assert_eq!(vote_classify(&neighbors, &y_train, 3), 2);
    }

    #[test]
    fn test_equal_distances_prefer_lower_row() {
        let x_train = array![[1.0], [-1.0], [1.0]];
        let nearest = find_k_nearest(array![0.0].view(), &x_train, 2);
        assert_eq!(nearest.iter().map(|n| n.1).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_model_selects_candidate_and_scales() {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for class in 0..2 {
            for i in 0..20 {
                // Second column has a huge range but no signal
                data.push(class as f64 * 3.0 + (i % 5) as f64 * 0.1);
                data.push(((i * 37) % 11) as f64 * 1000.0);
                y.push(class);
            }
        }
        let x = Array2::from_shape_vec((40, 2), data).unwrap();

        let mut model = KnnModel::new(KnnConfig {
            k_candidates: vec![9, 5, 7],
            cv_folds: 5,
        })
        .with_random_state(4);
        model.fit(&x, &y, 2).unwrap();

        assert_eq!(model.cv_scores().iter().map(|s| s.0).collect::<Vec<_>>(), vec![5, 7, 9]);
        assert!([5, 7, 9].contains(&model.selected_k().unwrap()));
        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 36);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = KnnModel::new(KnnConfig::default());
        assert!(matches!(model.predict(&array![[1.0]]), Err(AnalysisError::ModelNotFitted)));
    }
}
