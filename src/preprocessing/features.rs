//! Feature sets used by the model families

use crate::data::{Foot, Metric, PlayerRecord};
use crate::error::{AnalysisError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One model input column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Numeric(Metric),
    /// 1.0 for right-footed players, 0.0 otherwise
    RightFooted,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::Numeric(m) => m.column(),
            Feature::RightFooted => "preferred_foot",
        }
    }

    fn value(self, player: &PlayerRecord) -> Option<f64> {
        match self {
            Feature::Numeric(m) => player.value(m),
            Feature::RightFooted => player
                .preferred_foot
                .map(|f| if f == Foot::Right { 1.0 } else { 0.0 }),
        }
    }
}

/// The 14 columns the SVM family is trained on
pub const SVM_FEATURES: [Metric; 14] = [
    Metric::Goals90,
    Metric::Assists90,
    Metric::Xg90,
    Metric::Xag90,
    Metric::ProgCarries,
    Metric::ProgPasses,
    Metric::ProgReceives,
    Metric::HeightCm,
    Metric::WeightKg,
    Metric::WeakFoot,
    Metric::YellowCards,
    Metric::RedCards,
    Metric::PenaltiesAttempted,
    Metric::PenaltiesScored,
];

/// Metrics averaged per position for clustering
pub const CLUSTER_METRICS: [Metric; 7] = [
    Metric::Goals90,
    Metric::Assists90,
    Metric::Xg90,
    Metric::Xag90,
    Metric::ProgCarries,
    Metric::ProgPasses,
    Metric::ProgReceives,
];

/// Named selection of model input columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSet {
    /// Hand-picked per-90, physical and disciplinary columns
    Svm,
    /// Every numeric column plus the encoded preferred foot. The identifier,
    /// nationality and eligible-positions list are left out; the latter
    /// contains the target.
    Ensemble,
}

impl FeatureSet {
    pub fn features(self) -> Vec<Feature> {
        match self {
            FeatureSet::Svm => SVM_FEATURES.iter().map(|m| Feature::Numeric(*m)).collect(),
            FeatureSet::Ensemble => Metric::ALL
                .iter()
                .map(|m| Feature::Numeric(*m))
                .chain(std::iter::once(Feature::RightFooted))
                .collect(),
        }
    }

    pub fn names(self) -> Vec<String> {
        self.features().iter().map(|f| f.name().to_string()).collect()
    }

    /// Build the row-major feature matrix for `players`.
    ///
    /// A missing value is an error naming the player and column; nothing is
    /// imputed.
    pub fn extract(self, players: &[&PlayerRecord]) -> Result<Array2<f64>> {
        let features = self.features();
        let mut data = Vec::with_capacity(players.len() * features.len());
        for player in players {
            for feature in &features {
                let v = feature.value(player).ok_or_else(|| {
                    AnalysisError::DataError(format!(
                        "player '{}' has no value for '{}'",
                        player.player,
                        feature.name()
                    ))
                })?;
                data.push(v);
            }
        }
        Ok(Array2::from_shape_vec((players.len(), features.len()), data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Position;

    fn full_player(name: &str) -> PlayerRecord {
        let mut p = PlayerRecord::new(name, Position::CM).with_foot(Foot::Left);
        for (i, m) in Metric::ALL.iter().enumerate() {
            p.set_value(*m, Some(i as f64));
        }
        p
    }

    #[test]
    fn test_feature_set_widths() {
        assert_eq!(FeatureSet::Svm.features().len(), 14);
        assert_eq!(FeatureSet::Ensemble.features().len(), Metric::COUNT + 1);
    }

    #[test]
    fn test_extract_shape_and_order() {
        let a = full_player("A");
        let b = full_player("B").with_foot(Foot::Right);
        let x = FeatureSet::Ensemble.extract(&[&a, &b]).unwrap();
        assert_eq!(x.dim(), (2, Metric::COUNT + 1));
        assert_eq!(x[[0, 0]], 0.0);
        assert_eq!(x[[0, Metric::COUNT]], 0.0);
        assert_eq!(x[[1, Metric::COUNT]], 1.0);
    }

    #[test]
    fn test_missing_value_is_reported() {
        let mut a = full_player("A");
        a.set_value(Metric::WeakFoot, None);
        let err = FeatureSet::Svm.extract(&[&a]).unwrap_err();
        assert!(err.to_string().contains("weak_foot"));
    }
}
