//! Model training module
//!
//! The classifier families compared by the analysis:
//! - One-vs-one SVM with linear, radial and polynomial kernels
//! - Random forest and a ranger-style forest tuned by out-of-bag error
//! - Bagged decision trees
//! - k-nearest neighbours with k chosen by stratified cross-validation
//! - Linear discriminant analysis
//!
//! Every model consumes a dense `f64` matrix and class indices in
//! `0..n_classes`.

mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod knn;
pub mod lda;
pub mod random_forest;
pub mod svm;

pub use cross_validation::{CVSplit, StratifiedKFold};
pub use decision_tree::{DecisionTree, TreeNode};
pub use knn::{KnnClassifier, KnnConfig, KnnModel};
pub use lda::LinearDiscriminant;
pub use models::{
    check_class_support, fit_family, FeatureImportance, ModelDiagnostics, ModelFamily, ModelSettings, TrainedModel,
};
pub use random_forest::{ForestConfig, MaxFeatures, RandomForest, RangerConfig, RangerForest, TreeBagConfig};
pub use svm::{BinarySvm, KernelType, SvmClassifier, SvmConfig};

use crate::error::Result;
use ndarray::Array2;

/// Common fit/predict capability over class indices
pub trait Classifier: Send + Sync {
    /// Fit on `x` with labels in `0..n_classes`. Classes absent from `y`
    /// are never predicted.
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()>;

    /// Predict one class index per row
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>>;
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        DecisionTree::fit(self, x, y, n_classes).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        DecisionTree::predict(self, x)
    }
}
