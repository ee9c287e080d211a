//! Position profiling and hierarchical clustering
//!
//! Positions are summarised by their mean per-90 and progressive output,
//! standardised across positions, and agglomerated into a dendrogram that
//! shows which roles are statistically close. Purely descriptive; nothing
//! here predicts.

pub mod aggregate;
pub mod hierarchical;

pub use aggregate::{PositionAggregator, PositionProfiles};
pub use hierarchical::{euclidean_distances, AgglomerativeClustering, Dendrogram, Linkage, Merge};

use crate::data::{Metric, PlayerTable};
use crate::error::{AnalysisError, Result};
use crate::preprocessing::StandardScaler;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Clustering output: the profiles that went in and the merge tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClustering {
    pub profiles: PositionProfiles,
    pub dendrogram: Dendrogram,
}

/// Aggregate, standardise, measure and agglomerate.
///
/// Exclusions are applied before scaling. A metric that is constant across
/// the retained positions is rejected rather than silently rescaled.
pub fn cluster_positions(
    table: &PlayerTable,
    metrics: &[Metric],
    exclude: &[String],
    min_group_size: usize,
    linkage: Linkage,
) -> Result<PositionClustering> {
    let profiles = PositionAggregator::new(metrics)
        .with_exclude(exclude)
        .with_min_group_size(min_group_size)
        .aggregate(table)?;

    for (j, col) in profiles.means.axis_iter(Axis(1)).enumerate() {
        if col.std(1.0) <= f64::EPSILON {
            return Err(AnalysisError::ComputationError(format!(
                "metric '{}' has zero variance across positions",
                profiles.metrics[j].column()
            )));
        }
    }

    let scaled = StandardScaler::new().fit_transform(&profiles.means)?;
    let distances = euclidean_distances(&scaled);
    let labels = profiles.positions.iter().map(|p| p.code().to_string()).collect();
    let dendrogram = AgglomerativeClustering::new(linkage).fit(&distances, labels)?;

    info!(
        positions = profiles.positions.len(),
        linkage = ?linkage,
        "Built position dendrogram"
    );

    Ok(PositionClustering { profiles, dendrogram })
}
