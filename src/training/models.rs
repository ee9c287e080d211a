//! Model families and their fitted artifacts

use super::knn::{KnnConfig, KnnModel};
use super::lda::LinearDiscriminant;
use super::random_forest::{ForestConfig, RandomForest, RangerConfig, RangerForest, TreeBagConfig};
use super::svm::{KernelType, SvmClassifier, SvmConfig};
use super::Classifier;
use crate::data::Position;
use crate::error::{AnalysisError, Result};
use crate::preprocessing::FeatureSet;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Every classifier compared in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    SvmLinear,
    SvmRadial,
    SvmPolynomial,
    RandomForest,
    Ranger,
    Knn,
    #[serde(rename = "treebag")]
    TreeBag,
    Lda,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::SvmLinear,
        ModelFamily::SvmRadial,
        ModelFamily::SvmPolynomial,
        ModelFamily::RandomForest,
        ModelFamily::Ranger,
        ModelFamily::Knn,
        ModelFamily::TreeBag,
        ModelFamily::Lda,
    ];

    /// Stable identifier used in reports and on the command line
    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::SvmLinear => "svm_linear",
            ModelFamily::SvmRadial => "svm_radial",
            ModelFamily::SvmPolynomial => "svm_polynomial",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::Ranger => "ranger",
            ModelFamily::Knn => "knn",
            ModelFamily::TreeBag => "treebag",
            ModelFamily::Lda => "lda",
        }
    }

    /// Human-readable label for tables
    pub fn label(self) -> &'static str {
        match self {
            ModelFamily::SvmLinear => "SVM (linear)",
            ModelFamily::SvmRadial => "SVM (radial)",
            ModelFamily::SvmPolynomial => "SVM (polynomial)",
            ModelFamily::RandomForest => "Random forest",
            ModelFamily::Ranger => "Ranger",
            ModelFamily::Knn => "k-NN",
            ModelFamily::TreeBag => "Bagged trees",
            ModelFamily::Lda => "LDA",
        }
    }

    /// SVMs use the curated set; everything else the full metric set
    pub fn feature_set(self) -> FeatureSet {
        match self {
            ModelFamily::SvmLinear | ModelFamily::SvmRadial | ModelFamily::SvmPolynomial => FeatureSet::Svm,
            _ => FeatureSet::Ensemble,
        }
    }

    pub fn kernel(self) -> Option<KernelType> {
        match self {
            ModelFamily::SvmLinear => Some(KernelType::Linear),
            ModelFamily::SvmRadial => Some(KernelType::Radial),
            ModelFamily::SvmPolynomial => Some(KernelType::Polynomial),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ModelFamily {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        ModelFamily::ALL
            .into_iter()
            .find(|f| f.name() == key)
            .ok_or_else(|| AnalysisError::ConfigError(format!("unknown model family '{}'", s)))
    }
}

/// Hyperparameters for every family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub svm: SvmConfig,
    pub forest: ForestConfig,
    pub ranger: RangerConfig,
    pub treebag: TreeBagConfig,
    pub knn: KnnConfig,
}

/// Impurity importance of one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Family-specific facts about a fitted model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDiagnostics {
    pub n_train: usize,
    pub n_features: usize,
    pub fit_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_classifiers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unconverged_classifiers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_vectors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oob_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_mtry: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oob_by_mtry: Vec<(usize, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_k: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cv_accuracy_by_k: Vec<(usize, f64)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_features: Vec<String>,
    /// Sorted by decreasing importance
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feature_importance: Vec<FeatureImportance>,
}

/// A fitted model of one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    Svm(SvmClassifier),
    RandomForest(RandomForest),
    Ranger(RangerForest),
    Knn(KnnModel),
    TreeBag(RandomForest),
    Lda(LinearDiscriminant),
}

impl TrainedModel {
    /// Unfitted model of `family`
    fn untrained(family: ModelFamily, settings: &ModelSettings, seed: u64) -> Self {
        match family {
            ModelFamily::SvmLinear | ModelFamily::SvmRadial | ModelFamily::SvmPolynomial => {
                let kernel = family.kernel().unwrap_or(KernelType::Linear);
                TrainedModel::Svm(SvmClassifier::new(kernel, settings.svm.clone()).with_random_state(seed))
            }
            ModelFamily::RandomForest => {
                TrainedModel::RandomForest(RandomForest::from_config(&settings.forest).with_random_state(seed))
            }
            ModelFamily::Ranger => {
                TrainedModel::Ranger(RangerForest::new(settings.ranger.clone()).with_random_state(seed))
            }
            ModelFamily::Knn => TrainedModel::Knn(KnnModel::new(settings.knn.clone()).with_random_state(seed)),
            ModelFamily::TreeBag => {
                TrainedModel::TreeBag(RandomForest::bagged(settings.treebag.n_estimators).with_random_state(seed))
            }
            ModelFamily::Lda => TrainedModel::Lda(LinearDiscriminant::new()),
        }
    }

    fn classifier(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Svm(m) => m,
            TrainedModel::RandomForest(m) | TrainedModel::TreeBag(m) => m,
            TrainedModel::Ranger(m) => m,
            TrainedModel::Knn(m) => m,
            TrainedModel::Lda(m) => m,
        }
    }

    fn classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            TrainedModel::Svm(m) => m,
            TrainedModel::RandomForest(m) | TrainedModel::TreeBag(m) => m,
            TrainedModel::Ranger(m) => m,
            TrainedModel::Knn(m) => m,
            TrainedModel::Lda(m) => m,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        self.classifier().predict(x)
    }

    /// Diagnostics with feature indices resolved to `feature_names`
    pub fn diagnostics(&self, feature_names: &[String]) -> ModelDiagnostics {
        let name = |j: usize| feature_names.get(j).cloned().unwrap_or_else(|| format!("x{}", j));
        let importance = |imp: Option<&ndarray::Array1<f64>>| -> Vec<FeatureImportance> {
            let mut out: Vec<FeatureImportance> = imp
                .map(|a| {
                    a.iter()
                        .enumerate()
                        .map(|(j, &v)| FeatureImportance { feature: name(j), importance: v })
                        .collect()
                })
                .unwrap_or_default();
            out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            out
        };

        let mut d = ModelDiagnostics {
            n_features: feature_names.len(),
            ..ModelDiagnostics::default()
        };
        match self {
            TrainedModel::Svm(m) => {
                d.binary_classifiers = Some(m.n_binary_classifiers());
                d.unconverged_classifiers = Some(m.n_unconverged());
                d.support_vectors = Some(m.n_support_vectors());
            }
            TrainedModel::RandomForest(m) | TrainedModel::TreeBag(m) => {
                d.oob_error = m.oob_error();
                d.selected_mtry = Some(m.mtry());
                d.feature_importance = importance(m.feature_importances());
            }
            TrainedModel::Ranger(m) => {
                d.oob_error = m.oob_error();
                d.selected_mtry = m.selected_mtry();
                d.oob_by_mtry = m.oob_by_mtry().to_vec();
                d.feature_importance = importance(m.feature_importances());
            }
            TrainedModel::Knn(m) => {
                d.selected_k = m.selected_k();
                d.cv_accuracy_by_k = m.cv_scores().to_vec();
            }
            TrainedModel::Lda(m) => {
                d.dropped_features = m.dropped_features().iter().map(|&j| name(j)).collect();
            }
        }
        d
    }
}

/// Every class present in `y` needs at least `required` rows
pub fn check_class_support(model: &str, y: &[usize], n_classes: usize, required: usize) -> Result<()> {
    let mut counts = vec![0usize; n_classes];
    for &c in y {
        if c >= n_classes {
            return Err(AnalysisError::InvalidParameter {
                name: "y".to_string(),
                value: c.to_string(),
                reason: format!("class index outside 0..{}", n_classes),
            });
        }
        counts[c] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 && count < required {
            let class = Position::from_index(c).map_or_else(|| c.to_string(), |p| p.code().to_string());
            return Err(AnalysisError::DegenerateClass {
                model: model.to_string(),
                class,
                count,
                required,
            });
        }
    }
    if counts.iter().filter(|&&c| c > 0).count() < 2 {
        return Err(AnalysisError::DataError(format!("{} needs at least 2 classes", model)));
    }
    Ok(())
}

/// Check class support, then fit one family on the training matrix
pub fn fit_family(
    family: ModelFamily,
    x: &Array2<f64>,
    y: &[usize],
    n_classes: usize,
    settings: &ModelSettings,
    min_class_examples: usize,
    seed: u64,
) -> Result<TrainedModel> {
    check_class_support(family.name(), y, n_classes, min_class_examples)?;
    let mut model = TrainedModel::untrained(family, settings, seed);
    model.classifier_mut().fit(x, y, n_classes)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names_round_trip() {
        for family in ModelFamily::ALL {
            assert_eq!(family.name().parse::<ModelFamily>().unwrap(), family);
        }
        assert_eq!("SVM-Linear".parse::<ModelFamily>().unwrap(), ModelFamily::SvmLinear);
        assert!("xgboost".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_feature_sets() {
        assert_eq!(ModelFamily::SvmRadial.feature_set(), FeatureSet::Svm);
        assert_eq!(ModelFamily::Ranger.feature_set(), FeatureSet::Ensemble);
    }

    #[test]
    fn test_degenerate_class_reported() {
        let y = vec![0, 0, 1, 1, 5];
        let err = check_class_support("lda", &y, 12, 2).unwrap_err();
        match err {
            AnalysisError::DegenerateClass { class, count, .. } => {
                assert_eq!(class, Position::from_index(5).unwrap().code());
                assert_eq!(count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(check_class_support("lda", &[0, 0, 1, 1], 12, 2).is_ok());
        assert!(check_class_support("lda", &[3, 3, 3], 12, 2).is_err());
    }

    #[test]
    fn test_fit_family_lda_diagnostics() {
        let x = Array2::from_shape_vec(
            (6, 2),
            vec![0.0, 1.0, 0.2, 1.0, 0.1, 1.0, 3.0, 1.0, 3.1, 1.0, 2.9, 1.0],
        )
        .unwrap();
        let y = vec![0, 0, 0, 1, 1, 1];
        let names = vec!["gls_90".to_string(), "weak_foot".to_string()];
        let model = fit_family(ModelFamily::Lda, &x, &y, 12, &ModelSettings::default(), 2, 42).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.diagnostics(&names).dropped_features, vec!["weak_foot".to_string()]);
    }
}
