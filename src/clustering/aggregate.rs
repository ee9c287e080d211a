//! Per-position mean performance profiles

use crate::data::{Metric, PlayerTable, Position, N_POSITIONS};
use crate::error::{AnalysisError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One row per retained position: the mean of each metric over its players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionProfiles {
    pub positions: Vec<Position>,
    pub metrics: Vec<Metric>,
    /// Players contributing to each row
    pub counts: Vec<usize>,
    /// positions × metrics
    pub means: Array2<f64>,
}

/// Builds [`PositionProfiles`] from the cleaned table
#[derive(Debug, Clone)]
pub struct PositionAggregator {
    metrics: Vec<Metric>,
    exclude: Vec<String>,
    min_group_size: usize,
}

impl PositionAggregator {
    pub fn new(metrics: &[Metric]) -> Self {
        Self {
            metrics: metrics.to_vec(),
            exclude: Vec::new(),
            min_group_size: 1,
        }
    }

    /// Labels to leave out. Raw labels that the mapping table folds away
    /// (CF, LWB, RWB) no longer occur after loading; canonical codes are
    /// removed from the profile.
    pub fn with_exclude(mut self, labels: &[String]) -> Self {
        self.exclude = labels.iter().map(|l| l.trim().to_ascii_uppercase()).collect();
        self
    }

    /// Drop positions with fewer players than this
    pub fn with_min_group_size(mut self, n: usize) -> Self {
        self.min_group_size = n.max(1);
        self
    }

    fn is_excluded(&self, position: Position) -> bool {
        self.exclude.iter().any(|label| label == position.code())
    }

    /// Average every metric per main position, ignoring missing values.
    pub fn aggregate(&self, table: &PlayerTable) -> Result<PositionProfiles> {
        let n_metrics = self.metrics.len();
        let mut sums = vec![vec![0.0f64; n_metrics]; N_POSITIONS];
        let mut present = vec![vec![0usize; n_metrics]; N_POSITIONS];
        let mut counts = [0usize; N_POSITIONS];

        for player in table.players() {
            let c = player.main_position.index();
            counts[c] += 1;
            for (j, metric) in self.metrics.iter().enumerate() {
                if let Some(v) = player.value(*metric) {
                    sums[c][j] += v;
                    present[c][j] += 1;
                }
            }
        }

        let mut positions = Vec::new();
        let mut row_counts = Vec::new();
        let mut data = Vec::new();

        for position in Position::ALL {
            let c = position.index();
            if counts[c] == 0 {
                continue;
            }
            if self.is_excluded(position) {
                debug!(position = %position, "Excluded from position profiles");
                continue;
            }
            if counts[c] < self.min_group_size {
                debug!(position = %position, players = counts[c], "Too few players for a profile");
                continue;
            }
            for j in 0..n_metrics {
                if present[c][j] == 0 {
                    return Err(AnalysisError::DataError(format!(
                        "no values of '{}' for position {}",
                        self.metrics[j].column(),
                        position
                    )));
                }
                data.push(sums[c][j] / present[c][j] as f64);
            }
            positions.push(position);
            row_counts.push(counts[c]);
        }

        if positions.len() < 2 {
            return Err(AnalysisError::DataError(format!(
                "need at least 2 positions to cluster, found {}",
                positions.len()
            )));
        }

        let means = Array2::from_shape_vec((positions.len(), n_metrics), data)?;
        Ok(PositionProfiles {
            positions,
            metrics: self.metrics.clone(),
            counts: row_counts,
            means,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PlayerRecord;

    fn player(name: &str, pos: Position, goals90: Option<f64>, prgc: f64) -> PlayerRecord {
        let mut p = PlayerRecord::new(name, pos).with_metric(Metric::ProgCarries, prgc);
        p.set_value(Metric::Goals90, goals90);
        p
    }

    #[test]
    fn test_means_ignore_missing() {
        let table = PlayerTable::new(vec![
            player("a", Position::ST, Some(0.6), 20.0),
            player("b", Position::ST, None, 40.0),
            player("c", Position::CB, Some(0.0), 10.0),
        ]);
        let profiles = PositionAggregator::new(&[Metric::Goals90, Metric::ProgCarries])
            .aggregate(&table)
            .unwrap();
        assert_eq!(profiles.positions, vec![Position::CB, Position::ST]);
        assert!((profiles.means[[1, 0]] - 0.6).abs() < 1e-12);
        assert!((profiles.means[[1, 1]] - 30.0).abs() < 1e-12);
        assert_eq!(profiles.counts, vec![1, 2]);
    }

    #[test]
    fn test_exclusions_and_min_group() {
        let table = PlayerTable::new(vec![
            player("a", Position::ST, Some(0.5), 1.0),
            player("b", Position::ST, Some(0.5), 1.0),
            player("c", Position::CB, Some(0.1), 1.0),
            player("d", Position::CB, Some(0.1), 1.0),
            player("e", Position::GK, Some(0.0), 0.0),
            player("f", Position::GK, Some(0.0), 0.0),
            player("g", Position::LM, Some(0.2), 3.0),
        ]);
        let profiles = PositionAggregator::new(&[Metric::Goals90])
            .with_exclude(&["GK".to_string(), "CF".to_string()])
            .with_min_group_size(2)
            .aggregate(&table)
            .unwrap();
        assert_eq!(profiles.positions, vec![Position::CB, Position::ST]);
    }

    #[test]
    fn test_folded_label_does_not_exclude_its_target() {
        let table = PlayerTable::new(vec![
            player("a", Position::ST, Some(0.5), 1.0),
            player("b", Position::CB, Some(0.1), 1.0),
        ]);
        let profiles = PositionAggregator::new(&[Metric::Goals90])
            .with_exclude(&["CF".to_string()])
            .aggregate(&table)
            .unwrap();
        assert!(profiles.positions.contains(&Position::ST));
    }
}
