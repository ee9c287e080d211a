//! Random forest, ranger-style OOB tuning and bagged trees

use super::decision_tree::DecisionTree;
use super::Classifier;
use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Strategy for features drawn per node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// floor(sqrt(n_features)), the classification default
    Sqrt,
    /// Fixed number
    Fixed(usize),
    /// All features (bagging)
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

/// Random forest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    /// Features per node; `None` means floor(sqrt p)
    pub mtry: Option<usize>,
    pub min_samples_leaf: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            mtry: None,
            min_samples_leaf: 1,
        }
    }
}

/// Ranger-style forest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangerConfig {
    pub n_estimators: usize,
    /// Candidate mtry values; `None` means {floor(sqrt p), floor(p/3), floor(p/2)}
    pub mtry_candidates: Option<Vec<usize>>,
    pub min_samples_leaf: usize,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            mtry_candidates: None,
            min_samples_leaf: 1,
        }
    }
}

/// Bagged-tree settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeBagConfig {
    pub n_estimators: usize,
}

impl Default for TreeBagConfig {
    fn default() -> Self {
        Self { n_estimators: 25 }
    }
}

/// Majority vote; ties go to the lowest class index
fn vote(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = class;
        }
    }
    best
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Features drawn per node
    pub max_features: MaxFeatures,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Base seed; tree `i` uses `random_state + i`
    pub random_state: u64,
    n_features: usize,
    n_classes: usize,
    oob_error: Option<f64>,
    importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(500)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_features: MaxFeatures::Sqrt,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state: 42,
            n_features: 0,
            n_classes: 0,
            oob_error: None,
            importances: None,
        }
    }

    /// Bootstrap-aggregated trees that see every feature at every node
    pub fn bagged(n_estimators: usize) -> Self {
        Self::new(n_estimators).with_max_features(MaxFeatures::All)
    }

    pub fn from_config(config: &ForestConfig) -> Self {
        let max_features = config.mtry.map_or(MaxFeatures::Sqrt, MaxFeatures::Fixed);
        Self::new(config.n_estimators)
            .with_max_features(max_features)
            .with_min_samples_leaf(config.min_samples_leaf)
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(AnalysisError::DataError("empty training matrix".to_string()));
        }
        if self.n_estimators == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "need at least one tree".to_string(),
            });
        }

        self.n_features = n_features;
        self.n_classes = n_classes;
        let mtry = self.max_features.resolve(n_features);
        let base_seed = self.random_state;
        let bootstrap = self.bootstrap;
        let min_samples_leaf = self.min_samples_leaf;

        // Each tree owns its RNG, so the result does not depend on scheduling
        let built: Vec<(DecisionTree, Vec<bool>)> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<(DecisionTree, Vec<bool>)> {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut in_bag = vec![false; n_samples];
                for &i in &sample_indices {
                    in_bag[i] = true;
                }

                let mut tree = DecisionTree::new()
                    .with_min_samples_leaf(min_samples_leaf)
                    .with_max_features(mtry);
                tree.fit_indices(x, y, n_classes, &sample_indices, &mut rng)?;
                Ok((tree, in_bag))
            })
            .collect::<Result<_>>()?;

        let (trees, in_bag): (Vec<_>, Vec<_>) = built.into_iter().unzip();
        self.trees = trees;
        self.oob_error = if bootstrap { self.compute_oob_error(x, y, &in_bag)? } else { None };
        self.compute_importances();

        debug!(
            trees = self.trees.len(),
            mtry,
            oob_error = ?self.oob_error,
            "Fitted random forest"
        );

        Ok(self)
    }

    /// Misclassification rate of each row voted on only by the trees that
    /// did not see it. Rows that were in every bootstrap sample are skipped.
    fn compute_oob_error(&self, x: &Array2<f64>, y: &[usize], in_bag: &[Vec<bool>]) -> Result<Option<f64>> {
        let n_samples = x.nrows();
        let mut votes = vec![vec![0usize; self.n_classes]; n_samples];

        for (tree, bag) in self.trees.iter().zip(in_bag) {
            for (i, row) in x.rows().into_iter().enumerate() {
                if !bag[i] {
                    votes[i][tree.predict_row(row)?] += 1;
                }
            }
        }

        let mut scored = 0usize;
        let mut wrong = 0usize;
        for (i, counts) in votes.iter().enumerate() {
            if counts.iter().all(|&c| c == 0) {
                continue;
            }
            scored += 1;
            if vote(counts) != y[i] {
                wrong += 1;
            }
        }

        Ok((scored > 0).then(|| wrong as f64 / scored as f64))
    }

    /// Mean Gini decrease per tree, the ranger "impurity" measure
    fn compute_importances(&mut self) {
        let mut total = Array1::<f64>::zeros(self.n_features);
        for tree in &self.trees {
            if let Some(imp) = tree.impurity_decrease() {
                total += imp;
            }
        }
        if !self.trees.is_empty() {
            total /= self.trees.len() as f64;
        }
        self.importances = Some(total);
    }

    /// Vote counts per row and class
    pub fn predict_votes(&self, x: &Array2<f64>) -> Result<Array2<usize>> {
        if self.trees.is_empty() {
            return Err(AnalysisError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let rows: Vec<Vec<usize>> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|row| -> Result<Vec<usize>> {
                let mut counts = vec![0usize; self.n_classes];
                for tree in &self.trees {
                    counts[tree.predict_row(row)?] += 1;
                }
                Ok(counts)
            })
            .collect::<Result<_>>()?;

        let flat: Vec<usize> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.n_classes), flat)?)
    }

    /// Majority vote over trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let votes = self.predict_votes(x)?;
        Ok(votes
            .rows()
            .into_iter()
            .map(|row| vote(&row.to_vec()))
            .collect())
    }

    /// Out-of-bag misclassification rate, when bootstrapping
    pub fn oob_error(&self) -> Option<f64> {
        self.oob_error
    }

    /// Impurity importance per feature, unnormalised
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Features drawn per node in the fitted forest
    pub fn mtry(&self) -> usize {
        self.max_features.resolve(self.n_features)
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        RandomForest::fit(self, x, y, n_classes).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        RandomForest::predict(self, x)
    }
}

/// Forest that picks mtry by out-of-bag error instead of a validation fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangerForest {
    pub config: RangerConfig,
    pub random_state: u64,
    forest: Option<RandomForest>,
    /// OOB error for every candidate tried, in candidate order
    oob_by_mtry: Vec<(usize, f64)>,
}

impl RangerForest {
    pub fn new(config: RangerConfig) -> Self {
        Self {
            config,
            random_state: 42,
            forest: None,
            oob_by_mtry: Vec::new(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Sorted, deduplicated candidates clamped to 1..=p
    pub fn mtry_candidates(&self, n_features: usize) -> Vec<usize> {
        let p = n_features.max(1);
        let mut candidates = match &self.config.mtry_candidates {
            Some(list) => list.clone(),
            None => vec![(p as f64).sqrt().floor() as usize, p / 3, p / 2],
        };
        for m in candidates.iter_mut() {
            *m = (*m).clamp(1, p);
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    /// Grow one forest per candidate with the same seed and keep the one with
    /// the lowest OOB error. Ties keep the smaller mtry.
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<&mut Self> {
        let candidates = self.mtry_candidates(x.ncols());
        self.oob_by_mtry.clear();
        let mut best: Option<(f64, RandomForest)> = None;

        for mtry in candidates {
            let mut forest = RandomForest::new(self.config.n_estimators)
                .with_max_features(MaxFeatures::Fixed(mtry))
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(self.random_state);
            forest.fit(x, y, n_classes)?;

            let oob = forest.oob_error().ok_or_else(|| {
                AnalysisError::ComputationError("no out-of-bag rows to tune mtry".to_string())
            })?;
            debug!(mtry, oob_error = oob, "Ranger candidate");
            self.oob_by_mtry.push((mtry, oob));

            if best.as_ref().map_or(true, |(b, _)| oob < *b) {
                best = Some((oob, forest));
            }
        }

        let (_, forest) = best.ok_or_else(|| {
            AnalysisError::InvalidParameter {
                name: "mtry_candidates".to_string(),
                value: "[]".to_string(),
                reason: "no candidates to try".to_string(),
            }
        })?;
        self.forest = Some(forest);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        self.forest.as_ref().ok_or(AnalysisError::ModelNotFitted)?.predict(x)
    }

    pub fn selected_mtry(&self) -> Option<usize> {
        self.forest.as_ref().map(RandomForest::mtry)
    }

    pub fn oob_error(&self) -> Option<f64> {
        self.forest.as_ref().and_then(RandomForest::oob_error)
    }

    pub fn oob_by_mtry(&self) -> &[(usize, f64)] {
        &self.oob_by_mtry
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.forest.as_ref().and_then(RandomForest::feature_importances)
    }
}

impl Classifier for RangerForest {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        RangerForest::fit(self, x, y, n_classes).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        RangerForest::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three classes separated along the first feature, noise elsewhere
    fn blobs() -> (Array2<f64>, Vec<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut data = Vec::new();
        let mut y = Vec::new();
        for class in 0..3 {
            for _ in 0..20 {
                data.push(class as f64 * 5.0 + rng.gen_range(-1.0..1.0));
                data.push(rng.gen_range(-1.0..1.0));
                data.push(rng.gen_range(-1.0..1.0));
                data.push(rng.gen_range(-1.0..1.0));
                y.push(class);
            }
        }
        (Array2::from_shape_vec((60, 4), data).unwrap(), y)
    }

    #[test]
    fn test_forest_fits_separable_data() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new(50).with_random_state(7);
        rf.fit(&x, &y, 3).unwrap();

        let pred = rf.predict(&x).unwrap();
        let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 57, "only {} correct", correct);
        assert_eq!(rf.n_trees(), 50);
        assert_eq!(rf.mtry(), 2);
        assert!(rf.oob_error().unwrap() < 0.2);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = blobs();
        let mut a = RandomForest::new(20).with_random_state(11);
        let mut b = RandomForest::new(20).with_random_state(11);
        a.fit(&x, &y, 3).unwrap();
        b.fit(&x, &y, 3).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.oob_error(), b.oob_error());
    }

    #[test]
    fn test_importance_favours_signal_feature() {
        let (x, y) = blobs();
        let mut rf = RandomForest::bagged(25).with_random_state(3);
        rf.fit(&x, &y, 3).unwrap();
        let imp = rf.feature_importances().unwrap();
        for j in 1..4 {
            assert!(imp[0] > imp[j]);
        }
    }

    #[test]
    fn test_ranger_candidates_and_selection() {
        let (x, y) = blobs();
        let ranger = RangerForest::new(RangerConfig::default());
        assert_eq!(ranger.mtry_candidates(23), vec![4, 7, 11]);
        assert_eq!(ranger.mtry_candidates(4), vec![1, 2]);

        let mut ranger = RangerForest::new(RangerConfig {
            n_estimators: 30,
            ..RangerConfig::default()
        })
        .with_random_state(2);
        ranger.fit(&x, &y, 3).unwrap();

        let tried = ranger.oob_by_mtry();
        assert_eq!(tried.len(), 2);
        let min = tried.iter().map(|(_, e)| *e).fold(f64::INFINITY, f64::min);
        let first_min = tried.iter().find(|(_, e)| *e == min).unwrap().0;
        assert_eq!(ranger.selected_mtry(), Some(first_min));
        assert_eq!(ranger.oob_error(), Some(min));
    }

    #[test]
    fn test_ranger_tie_keeps_smaller_mtry() {
        // Every feature separates the classes, so every candidate scores 0
        let y: Vec<usize> = (0..30).map(|i| i / 10).collect();
        let x = Array2::from_shape_fn((30, 6), |(i, _)| y[i] as f64);
        let mut ranger = RangerForest::new(RangerConfig {
            n_estimators: 40,
            mtry_candidates: Some(vec![6, 2, 4]),
            ..RangerConfig::default()
        });
        ranger.fit(&x, &y, 3).unwrap();

        assert_eq!(ranger.oob_by_mtry(), &[(2, 0.0), (4, 0.0), (6, 0.0)]);
        assert_eq!(ranger.selected_mtry(), Some(2));
    }

    #[test]
    fn test_unfitted_forest() {
        let rf = RandomForest::new(5);
        assert!(matches!(rf.predict(&Array2::zeros((1, 2))), Err(AnalysisError::ModelNotFitted)));
    }
}
