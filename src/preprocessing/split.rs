//! Stratified train/test partitioning

use crate::data::{Position, N_POSITIONS};
use crate::error::{AnalysisError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Disjoint train/test row indices over the player table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub seed: u64,
    pub train_fraction: f64,
}

/// Per-class partition sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSplit {
    pub position: Position,
    pub train: usize,
    pub test: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Train/test counts for every class present in `labels`
    pub fn class_summary(&self, labels: &[usize]) -> Vec<ClassSplit> {
        let mut counts = [(0usize, 0usize); N_POSITIONS];
        for &i in &self.train {
            counts[labels[i]].0 += 1;
        }
        for &i in &self.test {
            counts[labels[i]].1 += 1;
        }
        counts
            .iter()
            .enumerate()
            .filter(|(_, (tr, te))| tr + te > 0)
            .filter_map(|(c, (tr, te))| {
                Position::from_index(c).map(|position| ClassSplit { position, train: *tr, test: *te })
            })
            .collect()
    }
}

/// Split row indices so every class keeps roughly `train_fraction` of its
/// rows in training and at least one row on each side.
///
/// Per class, rows are shuffled with a ChaCha8 stream seeded from `seed` and
/// the first `ceil(n * train_fraction)` (clamped to `1..=n-1`) go to
/// training. Both index lists come back sorted, so the result depends only
/// on `labels`, `train_fraction` and `seed`.
pub fn stratified_split(labels: &[usize], train_fraction: f64, seed: u64) -> Result<Partition> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(AnalysisError::InvalidParameter {
            name: "train_fraction".to_string(),
            value: train_fraction.to_string(),
            reason: "must be strictly between 0 and 1".to_string(),
        });
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (class, mut indices) in by_class {
        let n = indices.len();
        if n < 2 {
            return Err(AnalysisError::DegenerateClass {
                model: "stratified split".to_string(),
                class: class_name(class),
                count: n,
                required: 2,
            });
        }
        indices.shuffle(&mut rng);
        let n_train = ((n as f64 * train_fraction).ceil() as usize).clamp(1, n - 1);
        train.extend_from_slice(&indices[..n_train]);
        test.extend_from_slice(&indices[n_train..]);
    }

    train.sort_unstable();
    test.sort_unstable();

    Ok(Partition { train, test, seed, train_fraction })
}

fn class_name(class: usize) -> String {
    Position::from_index(class)
        .map(|p| p.code().to_string())
        .unwrap_or_else(|| class.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<usize> {
        let mut y = Vec::new();
        for (class, n) in [(1usize, 84usize), (11, 60), (7, 20), (8, 20), (0, 30)] {
            y.extend(std::iter::repeat(class).take(n));
        }
        y
    }

    #[test]
    fn test_sizes_sum_to_input() {
        let y = labels();
        let p = stratified_split(&y, 0.7, 42).unwrap();
        assert_eq!(p.len(), y.len());
        let mut all: Vec<usize> = p.train.iter().chain(p.test.iter()).copied().collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), y.len());
    }

    #[test]
    fn test_class_proportions() {
        let y = labels();
        let p = stratified_split(&y, 0.7, 7).unwrap();
        for cs in p.class_summary(&y) {
            let frac = cs.train as f64 / (cs.train + cs.test) as f64;
            assert!((frac - 0.7).abs() < 0.06, "{}: {}", cs.position, frac);
            assert!(cs.test >= 1);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let y = labels();
        assert_eq!(stratified_split(&y, 0.7, 3).unwrap(), stratified_split(&y, 0.7, 3).unwrap());
        assert_ne!(stratified_split(&y, 0.7, 3).unwrap().train, stratified_split(&y, 0.7, 4).unwrap().train);
    }

    #[test]
    fn test_singleton_class_is_degenerate() {
        let y = vec![0, 0, 0, 1];
        let err = stratified_split(&y, 0.7, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateClass { count: 1, .. }));
    }
}
