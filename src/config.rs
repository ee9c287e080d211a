//! Run configuration

use crate::clustering::Linkage;
use crate::error::{AnalysisError, Result};
use crate::training::{ModelFamily, ModelSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one end-to-end analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Seed for the split and every randomised model
    pub seed: u64,

    /// Share of each class placed in the training partition
    pub train_fraction: f64,

    /// Fewest training rows a present class may have before a model refuses
    /// to fit
    pub min_class_examples: usize,

    pub linkage: Linkage,

    /// Raw position labels left out of the dendrogram
    pub cluster_exclude: Vec<String>,

    /// Positions with fewer players are left out of the dendrogram
    pub cluster_min_group_size: usize,

    /// Hyperparameters, one block per family
    #[serde(flatten)]
    pub models: ModelSettings,

    /// Families to fit, in report order
    pub families: Vec<ModelFamily>,

    /// Fit families concurrently
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            train_fraction: 0.7,
            min_class_examples: 2,
            linkage: Linkage::Complete,
            cluster_exclude: vec!["CF".to_string(), "LWB".to_string(), "RWB".to_string()],
            cluster_min_group_size: 2,
            models: ModelSettings::default(),
            families: ModelFamily::ALL.to_vec(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction;
        self
    }

    pub fn with_min_class_examples(mut self, n: usize) -> Self {
        self.min_class_examples = n;
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn with_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.families = families;
        self
    }

    pub fn with_models(mut self, models: ModelSettings) -> Self {
        self.models = models;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(AnalysisError::ConfigError(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if self.min_class_examples == 0 {
            return Err(AnalysisError::ConfigError("min_class_examples must be at least 1".to_string()));
        }
        if self.families.is_empty() {
            return Err(AnalysisError::ConfigError("no model families selected".to_string()));
        }
        if self.models.knn.k_candidates.is_empty() || self.models.knn.k_candidates.contains(&0) {
            return Err(AnalysisError::ConfigError("knn.k_candidates must be non-empty and positive".to_string()));
        }
        if self.models.knn.cv_folds < 2 {
            return Err(AnalysisError::ConfigError("knn.cv_folds must be at least 2".to_string()));
        }
        if self.models.svm.cost <= 0.0 {
            return Err(AnalysisError::ConfigError("svm.cost must be positive".to_string()));
        }
        if self.models.forest.n_estimators == 0
            || self.models.ranger.n_estimators == 0
            || self.models.treebag.n_estimators == 0
        {
            return Err(AnalysisError::ConfigError("forests need at least one tree".to_string()));
        }
        Ok(())
    }

    /// Read a JSON config; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.train_fraction, 0.7);
        assert_eq!(config.linkage, Linkage::Complete);
        assert_eq!(config.families.len(), 8);
        assert_eq!(config.models.forest.n_estimators, 500);
        assert_eq!(config.models.knn.k_candidates, vec![5, 7, 9]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = AnalysisConfig::new()
            .with_seed(7)
            .with_linkage(Linkage::Average)
            .with_families(vec![ModelFamily::Lda])
            .with_parallel(false);
        assert_eq!(config.seed, 7);
        assert_eq!(config.families, vec![ModelFamily::Lda]);
        assert!(!config.parallel);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"seed": 3, "treebag": {"n_estimators": 10}, "families": ["knn", "lda"]}"#)
                .unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.models.treebag.n_estimators, 10);
        assert_eq!(config.models.forest.n_estimators, 500);
        assert_eq!(config.families, vec![ModelFamily::Knn, ModelFamily::Lda]);
    }

    #[test]
    fn test_single_hyperparameter_override() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"svm": {"cost": 2.0}}"#).unwrap();
        assert_eq!(config.models.svm.cost, 2.0);
        assert_eq!(config.models.svm.tol, 1e-3);
        assert_eq!(config.models.svm.max_iter, 1000);

        let config: AnalysisConfig =
            serde_json::from_str(r#"{"forest": {"mtry": 3}, "ranger": {"n_estimators": 50}, "knn": {"cv_folds": 5}}"#)
                .unwrap();
        assert_eq!(config.models.forest.mtry, Some(3));
        assert_eq!(config.models.forest.n_estimators, 500);
        assert_eq!(config.models.ranger.n_estimators, 50);
        assert_eq!(config.models.ranger.min_samples_leaf, 1);
        assert_eq!(config.models.knn.cv_folds, 5);
        assert_eq!(config.models.knn.k_candidates, vec![5, 7, 9]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(AnalysisConfig::new().with_train_fraction(1.0).validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        AnalysisConfig::new().with_seed(11).save(&path).unwrap();
        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 11);
        assert_eq!(loaded.cluster_exclude, vec!["CF", "LWB", "RWB"]);
    }
}
