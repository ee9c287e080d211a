//! Linear discriminant analysis
//!
//! Gaussian class conditionals with one pooled within-class covariance.
//! Features are standardised by their pooled within-class deviation and
//! admitted one at a time through an incremental Cholesky factorisation;
//! a feature whose pivot falls below `tol` is constant or a linear
//! combination of earlier ones and is dropped.

use super::Classifier;
use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Solve L v = b for lower-triangular L
fn forward_substitute(l: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut v = vec![0.0; n];
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * v[j];
        }
        v[i] = (b[i] - sum) / l[[i, i]];
    }
    v
}

/// Solve L^T x = y for lower-triangular L
fn back_substitute(l: &Array2<f64>, y: &[f64]) -> Vec<f64> {
    let n = y.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDiscriminant {
    /// Relative pivot below which a feature is dropped
    pub tol: f64,
    classes: Vec<usize>,
    priors: Vec<f64>,
    n_classes: usize,
    n_features: usize,
    kept: Vec<usize>,
    dropped: Vec<usize>,
    /// Pooled within-class deviation of each kept feature
    scales: Array1<f64>,
    /// classes × kept
    coefs: Array2<f64>,
    intercepts: Array1<f64>,
    is_fitted: bool,
}

impl Default for LinearDiscriminant {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearDiscriminant {
    pub fn new() -> Self {
        Self {
            tol: 1e-8,
            classes: Vec::new(),
            priors: Vec::new(),
            n_classes: 0,
            n_features: 0,
            kept: Vec::new(),
            dropped: Vec::new(),
            scales: Array1::zeros(0),
            coefs: Array2::zeros((0, 0)),
            intercepts: Array1::zeros(0),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(AnalysisError::InvalidParameter {
                name: "y".to_string(),
                value: bad.to_string(),
                reason: format!("class index outside 0..{}", n_classes),
            });
        }

        let mut counts = vec![0usize; n_classes];
        for &c in y {
            counts[c] += 1;
        }
        let classes: Vec<usize> = (0..n_classes).filter(|&c| counts[c] > 0).collect();
        let k = classes.len();
        if k < 2 {
            return Err(AnalysisError::DataError("LDA requires at least 2 distinct classes".to_string()));
        }
        if n <= k {
            return Err(AnalysisError::SingularMatrix(format!(
                "pooled covariance needs more than {} rows, got {}",
                k, n
            )));
        }

        // Class means
        let mut means = Array2::<f64>::zeros((n_classes, p));
        for (row, &c) in x.rows().into_iter().zip(y) {
            let mut m = means.row_mut(c);
            m += &row;
        }
        for &c in &classes {
            let mut m = means.row_mut(c);
            m /= counts[c] as f64;
        }

        // Pooled within-class covariance
        let mut centered = x.clone();
        for (mut row, &c) in centered.rows_mut().into_iter().zip(y) {
            row -= &means.row(c);
        }
        let pooled = centered.t().dot(&centered) / (n - k) as f64;
        let total_var = x.var_axis(Axis(0), 1.0);

        let mut kept: Vec<usize> = Vec::new();
        let mut dropped: Vec<usize> = Vec::new();
        let mut scales: Vec<f64> = Vec::new();
        let mut l_rows: Vec<Vec<f64>> = Vec::new();

        for j in 0..p {
            let var = pooled[[j, j]];
            if !(var > 0.0) || var < self.tol * total_var[j] {
                dropped.push(j);
                continue;
            }
            let sd = var.sqrt();

            // Correlations with the features already admitted
            let r: Vec<f64> = kept
                .iter()
                .zip(&scales)
                .map(|(&i, &si)| pooled[[i, j]] / (si * sd))
                .collect();
            let l_now = lower_from_rows(&l_rows);
            let v = forward_substitute(&l_now, &r);
            let pivot = 1.0 - v.iter().map(|a| a * a).sum::<f64>();
            if pivot < self.tol {
                dropped.push(j);
                continue;
            }

            let mut row = v;
            row.push(pivot.sqrt());
            l_rows.push(row);
            kept.push(j);
            scales.push(sd);
        }

        if kept.is_empty() {
            return Err(AnalysisError::SingularMatrix(
                "every feature is constant or collinear within classes".to_string(),
            ));
        }
        if !dropped.is_empty() {
            warn!(dropped = ?dropped, "LDA dropped constant or collinear features");
        }

        let l = lower_from_rows(&l_rows);
        let m = kept.len();
        let mut coefs = Array2::<f64>::zeros((n_classes, m));
        let mut intercepts = Array1::<f64>::from_elem(n_classes, f64::NEG_INFINITY);
        let mut priors = vec![0.0; n_classes];

        for &c in &classes {
            let mu: Vec<f64> = kept.iter().zip(&scales).map(|(&j, &s)| means[[c, j]] / s).collect();
            let w = back_substitute(&l, &forward_substitute(&l, &mu));
            let quad: f64 = mu.iter().zip(&w).map(|(a, b)| a * b).sum();
            priors[c] = counts[c] as f64 / n as f64;
            coefs.row_mut(c).assign(&Array1::from_vec(w));
            intercepts[c] = -0.5 * quad + priors[c].ln();
        }

        self.classes = classes;
        self.priors = priors;
        self.n_classes = n_classes;
        self.n_features = p;
        self.kept = kept;
        self.dropped = dropped;
        self.scales = Array1::from_vec(scales);
        self.coefs = coefs;
        self.intercepts = intercepts;
        self.is_fitted = true;
        Ok(self)
    }

    /// Linear discriminant scores, rows × n_classes. Classes absent from
    /// training score negative infinity.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(AnalysisError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let z = x.select(Axis(1), &self.kept) / &self.scales;
        let mut scores = z.dot(&self.coefs.t());
        for mut row in scores.rows_mut() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = if self.intercepts[c].is_finite() { *v + self.intercepts[c] } else { f64::NEG_INFINITY };
            }
        }
        Ok(scores)
    }

    /// Posterior class probabilities, rows × n_classes
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        for mut row in scores.rows_mut() {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
        Ok(scores)
    }

    /// Highest posterior; ties go to the lowest class index
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let scores = self.decision_function(x)?;
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (c, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = c;
                    }
                }
                best
            })
            .collect())
    }

    /// Feature indices dropped as constant or collinear
    pub fn dropped_features(&self) -> &[usize] {
        &self.dropped
    }

    pub fn kept_features(&self) -> &[usize] {
        &self.kept
    }

    pub fn priors(&self) -> &[f64] {
        &self.priors
    }
}

/// Square lower-triangular matrix from ragged rows
fn lower_from_rows(rows: &[Vec<f64>]) -> Array2<f64> {
    let m = rows.len();
    let mut l = Array2::zeros((m, m));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            l[[i, j]] = v;
        }
    }
    l
}

impl Classifier for LinearDiscriminant {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        LinearDiscriminant::fit(self, x, y, n_classes).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        LinearDiscriminant::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Columns: signal x, signal y, 2x + 1, constant
    fn data() -> (Array2<f64>, Vec<usize>) {
        let centers = [(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for _ in 0..20 {
                let a = cx + rng.gen_range(-1.0..1.0);
                let b = cy + rng.gen_range(-1.0..1.0);
                rows.extend_from_slice(&[a, b, 2.0 * a + 1.0, 3.0]);
                y.push(class + 1);
            }
        }
        (Array2::from_shape_vec((60, 4), rows).unwrap(), y)
    }

    #[test]
    fn test_drops_collinear_and_constant() {
        let (x, y) = data();
        let mut lda = LinearDiscriminant::new();
        lda.fit(&x, &y, 4).unwrap();
        assert_eq!(lda.kept_features(), &[0, 1]);
        assert_eq!(lda.dropped_features(), &[2, 3]);

        let pred = lda.predict(&x).unwrap();
        let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 54, "only {} correct", correct);
        assert!(pred.iter().all(|&p| p != 0));
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let (x, y) = data();
        let mut lda = LinearDiscriminant::new();
        lda.fit(&x, &y, 4).unwrap();
        let proba = lda.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert_eq!(row[0], 0.0);
        }
        let priors = lda.priors();
        assert!((priors[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_constant_is_singular() {
        let x = Array2::from_elem((6, 2), 1.0);
        let y = vec![0, 0, 0, 1, 1, 1];
        let err = LinearDiscriminant::new().fit(&x, &y, 2).unwrap_err();
        assert!(matches!(err, AnalysisError::SingularMatrix(_)));
    }

    #[test]
    fn test_requires_two_classes() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(LinearDiscriminant::new().fit(&x, &[0, 0, 0], 2).is_err());
    }
}
