//! One-vs-one support vector classification
//!
//! Every pair of training classes gets its own binary machine trained with
//! SMO (Sequential Minimal Optimization). Prediction collects one vote per
//! machine; the class with the most votes wins and ties go to the lowest
//! class index, as in libsvm.

use super::Classifier;
use crate::error::{AnalysisError, Result};
use crate::preprocessing::StandardScaler;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum rows in one binary sub-problem. The kernel matrix is built
/// eagerly, so this bounds memory.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = exp(-γ ||x - y||²)
    Radial,
    /// K(x, y) = (γ x · y + r)^d
    Polynomial,
}

impl KernelType {
    pub fn name(self) -> &'static str {
        match self {
            KernelType::Linear => "linear",
            KernelType::Radial => "radial",
            KernelType::Polynomial => "polynomial",
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    /// Regularization parameter (C)
    pub cost: f64,
    /// KKT tolerance
    pub tol: f64,
    /// Sweeps without any update before a machine counts as converged
    pub max_passes: usize,
    /// Hard cap on sweeps per machine
    pub max_iter: usize,
    /// Polynomial degree
    pub degree: u32,
    /// Kernel width; `None` means 1 / n_features
    pub gamma: Option<f64>,
    /// Polynomial offset
    pub coef0: f64,
    /// Standardise features with training statistics before fitting
    pub scale: bool,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            cost: 1.0,
            tol: 1e-3,
            max_passes: 5,
            max_iter: 1000,
            degree: 3,
            gamma: None,
            coef0: 0.0,
            scale: true,
        }
    }
}

/// Kernel with every parameter resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    kind: KernelType,
    gamma: f64,
    degree: u32,
    coef0: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree as i32),
            KernelType::Radial => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
                (-self.gamma * norm_sq).exp()
            }
        }
    }

    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let val = self.eval(x.row(i), x.row(j));
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        k
    }
}

/// Binary machine separating `positive` (+1) from `negative` (-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySvm {
    pub positive: usize,
    pub negative: usize,
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    coefs: Array1<f64>,
    bias: f64,
    pub converged: bool,
    pub iterations: usize,
}

impl BinarySvm {
    fn decision(&self, kernel: &Kernel, row: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.coefs.iter())
            .map(|(sv, c)| c * kernel.eval(sv, row))
            .sum::<f64>()
            + self.bias
    }

    /// Class this machine votes for
    fn vote(&self, kernel: &Kernel, row: ArrayView1<f64>) -> usize {
        if self.decision(kernel, row) > 0.0 {
            self.positive
        } else {
            self.negative
        }
    }

    pub fn n_support(&self) -> usize {
        self.coefs.len()
    }
}

/// Winner of a vote count; ties go to the lowest class index
fn vote_winner(votes: &[usize]) -> usize {
    let mut best = 0;
    for (class, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = class;
        }
    }
    best
}

/// Multi-class SVM classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    pub kernel_type: KernelType,
    config: SvmConfig,
    /// Base seed; pair `k` uses `random_state + k`
    pub random_state: u64,
    kernel: Option<Kernel>,
    scaler: Option<StandardScaler>,
    /// Classes seen in training, ascending
    classes: Vec<usize>,
    n_classes: usize,
    n_features: usize,
    machines: Vec<BinarySvm>,
}

impl SvmClassifier {
    pub fn new(kernel_type: KernelType, config: SvmConfig) -> Self {
        Self {
            kernel_type,
            config,
            random_state: 42,
            kernel: None,
            scaler: None,
            classes: Vec::new(),
            n_classes: 0,
            n_features: 0,
            machines: Vec::new(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit one binary machine per pair of classes present in `y`
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
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

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(AnalysisError::DataError(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let x = if self.config.scale {
            let mut scaler = StandardScaler::new();
            let scaled = scaler.fit_transform(x)?;
            self.scaler = Some(scaler);
            scaled
        } else {
            self.scaler = None;
            x.clone()
        };

        let n_features = x.ncols();
        let kernel = Kernel {
            kind: self.kernel_type,
            gamma: self.config.gamma.unwrap_or(1.0 / n_features.max(1) as f64),
            degree: self.config.degree,
            coef0: self.config.coef0,
        };

        let pairs: Vec<(usize, usize)> = classes
            .iter()
            .enumerate()
            .flat_map(|(i, &a)| classes[i + 1..].iter().map(move |&b| (a, b)))
            .collect();

        let config = &self.config;
        let base_seed = self.random_state;
        let machines: Vec<BinarySvm> = pairs
            .par_iter()
            .enumerate()
            .map(|(pair_idx, &(positive, negative))| {
                let rows: Vec<usize> = (0..y.len())
                    .filter(|&i| y[i] == positive || y[i] == negative)
                    .collect();
                let x_pair = x.select(Axis(0), &rows);
                let y_pair: Array1<f64> = rows
                    .iter()
                    .map(|&i| if y[i] == positive { 1.0 } else { -1.0 })
                    .collect();
                let seed = base_seed.wrapping_add(pair_idx as u64);
                smo_train(config, &kernel, &x_pair, &y_pair, seed).map(|(alphas, bias, converged, iterations)| {
                    let support: Vec<usize> = (0..alphas.len()).filter(|&i| alphas[i] > 1e-8).collect();
                    BinarySvm {
                        positive,
                        negative,
                        support_vectors: x_pair.select(Axis(0), &support),
                        coefs: support.iter().map(|&i| alphas[i] * y_pair[i]).collect(),
                        bias,
                        converged,
                        iterations,
                    }
                })
            })
            .collect::<Result<_>>()?;

        let unconverged = machines.iter().filter(|m| !m.converged).count();
        if unconverged > 0 {
            for m in machines.iter().filter(|m| !m.converged) {
                debug!(positive = m.positive, negative = m.negative, iterations = m.iterations, "SMO hit max_iter");
            }
            warn!(
                kernel = self.kernel_type.name(),
                unconverged,
                machines = machines.len(),
                "Some binary SVMs did not converge"
            );
        }

        self.kernel = Some(kernel);
        self.classes = classes;
        self.n_classes = n_classes;
        self.n_features = n_features;
        self.machines = machines;
        Ok(())
    }

    /// Predict by one-vs-one majority vote
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let kernel = self.kernel.as_ref().ok_or(AnalysisError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let x = match &self.scaler {
            Some(scaler) => scaler.transform(x)?,
            None => x.clone(),
        };

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut votes = vec![0usize; self.n_classes];
                for machine in &self.machines {
                    votes[machine.vote(kernel, row)] += 1;
                }
                vote_winner(&votes)
            })
            .collect())
    }

    /// Number of binary machines: C(k, 2) for k training classes
    pub fn n_binary_classifiers(&self) -> usize {
        self.machines.len()
    }

    /// Machines that stopped at `max_iter`
    pub fn n_unconverged(&self) -> usize {
        self.machines.iter().filter(|m| !m.converged).count()
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(BinarySvm::n_support).sum()
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn machines(&self) -> &[BinarySvm] {
        &self.machines
    }
}

impl Classifier for SvmClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        SvmClassifier::fit(self, x, y, n_classes)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        SvmClassifier::predict(self, x)
    }
}

/// Simplified SMO. Returns (alphas, bias, converged, sweeps).
fn smo_train(
    config: &SvmConfig,
    kernel: &Kernel,
    x: &Array2<f64>,
    y: &Array1<f64>,
    seed: u64,
) -> Result<(Array1<f64>, f64, bool, usize)> {
    let n = x.nrows();
    if n > MAX_KERNEL_MATRIX_SAMPLES {
        return Err(AnalysisError::InvalidParameter {
            name: "n_samples".to_string(),
            value: n.to_string(),
            reason: format!("exceeds {} rows for an eager kernel matrix", MAX_KERNEL_MATRIX_SAMPLES),
        });
    }

    let c = config.cost;
    let tol = config.tol;
    let k = kernel.matrix(x);
    let mut alphas = Array1::<f64>::zeros(n);
    let mut bias = 0.0;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
        let mut sum = bias;
        for i in 0..n {
            if alphas[i] != 0.0 {
                sum += alphas[i] * y[i] * k[[i, idx]];
            }
        }
        sum
    };

    let mut passes = 0;
    let mut sweeps = 0;

    while n > 1 && passes < config.max_passes && sweeps < config.max_iter {
        let mut num_changed = 0;

        for i in 0..n {
            let e_i = decision(&alphas, bias, i) - y[i];

            // KKT violation
            if !((y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0)) {
                continue;
            }

            let j = loop {
                let j = rng.gen_range(0..n);
                if j != i {
                    break j;
                }
            };
            let e_j = decision(&alphas, bias, j) - y[j];

            let alpha_i_old = alphas[i];
            let alpha_j_old = alphas[j];

            let (l, h) = if y[i] != y[j] {
                ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
            } else {
                ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
            };
            if (l - h).abs() < 1e-10 {
                continue;
            }

            let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
            if eta >= 0.0 {
                continue;
            }

            alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
            if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                continue;
            }
            alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

            let b1 = bias
                - e_i
                - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
            let b2 = bias
                - e_j
                - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];

            bias = if alphas[i] > 0.0 && alphas[i] < c {
                b1
            } else if alphas[j] > 0.0 && alphas[j] < c {
                b2
            } else {
                (b1 + b2) / 2.0
            };

            num_changed += 1;
        }

        sweeps += 1;
        if num_changed == 0 {
            passes += 1;
        } else {
            passes = 0;
        }
    }

    let converged = n <= 1 || passes >= config.max_passes;
    Ok((alphas, bias, converged, sweeps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> (Array2<f64>, Vec<usize>) {
        let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut data = Vec::new();
        let mut y = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for _ in 0..15 {
                data.push(cx + rng.gen_range(-0.5..0.5));
                data.push(cy + rng.gen_range(-0.5..0.5));
                y.push(class * 4);
            }
        }
        (Array2::from_shape_vec((45, 2), data).unwrap(), y)
    }

    #[test]
    fn test_one_vs_one_machine_count() {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for class in 0..12 {
            for k in 0..3 {
                data.push(class as f64 * 3.0 + k as f64 * 0.1);
                data.push((class % 4) as f64);
                y.push(class);
            }
        }
        let x = Array2::from_shape_vec((36, 2), data).unwrap();

        let mut svm = SvmClassifier::new(KernelType::Linear, SvmConfig::default());
        svm.fit(&x, &y, 12).unwrap();
        assert_eq!(svm.n_binary_classifiers(), 66);
        assert_eq!(svm.classes().len(), 12);
        assert_eq!(svm.predict(&x).unwrap().len(), 36);
    }

    #[test]
    fn test_kernels_separate_blobs() {
        let (x, y) = three_blobs();
        for kernel in [KernelType::Linear, KernelType::Radial, KernelType::Polynomial] {
            let mut svm = SvmClassifier::new(kernel, SvmConfig::default()).with_random_state(3);
            svm.fit(&x, &y, 12).unwrap();
            assert_eq!(svm.n_binary_classifiers(), 3);
            let pred = svm.predict(&x).unwrap();
            let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
            assert!(correct >= 40, "{:?}: {} correct", kernel, correct);
            // Never predicts a class that was absent from training
            assert!(pred.iter().all(|p| [0, 4, 8].contains(p)));
        }
    }

    #[test]
    fn test_vote_ties_go_to_lowest_index() {
        assert_eq!(vote_winner(&[0, 2, 2, 1]), 1);
        assert_eq!(vote_winner(&[1, 1, 1]), 0);
        assert_eq!(vote_winner(&[0, 0, 3]), 2);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let (x, y) = three_blobs();
        let mut a = SvmClassifier::new(KernelType::Radial, SvmConfig::default()).with_random_state(9);
        let mut b = SvmClassifier::new(KernelType::Radial, SvmConfig::default()).with_random_state(9);
        a.fit(&x, &y, 12).unwrap();
        b.fit(&x, &y, 12).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.n_support_vectors(), b.n_support_vectors());
    }

    #[test]
    fn test_sweep_cap_marks_machines_unconverged() {
        let (x, y) = three_blobs();
        let config = SvmConfig { max_iter: 1, ..SvmConfig::default() };
        let mut svm = SvmClassifier::new(KernelType::Radial, config).with_random_state(4);
        svm.fit(&x, &y, 12).unwrap();
        assert_eq!(svm.n_unconverged(), 3);
        assert!(svm.machines().iter().all(|m| !m.converged && m.iterations == 1));

        let mut svm = SvmClassifier::new(KernelType::Radial, SvmConfig::default()).with_random_state(4);
        svm.fit(&x, &y, 12).unwrap();
        assert_eq!(svm.n_unconverged(), 0);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((4, 2));
        let mut svm = SvmClassifier::new(KernelType::Linear, SvmConfig::default());
        assert!(svm.fit(&x, &[1, 1, 1, 1], 12).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let svm = SvmClassifier::new(KernelType::Linear, SvmConfig::default());
        assert!(matches!(svm.predict(&Array2::zeros((1, 2))), Err(AnalysisError::ModelNotFitted)));
    }
}
