//! Held-out evaluation of fitted models
//!
//! Exact-match accuracy and kappa judge the main position only. Total
//! accuracy also credits a prediction that names one of the player's other
//! listed positions, so it is never below exact accuracy.

pub mod metrics;

pub use metrics::{total_accuracy, ConfusionMatrix};

use crate::data::{PlayerRecord, Position, N_POSITIONS};
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// Recall for one position on the test partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRecall {
    pub position: Position,
    /// Test rows whose main position is this one
    pub support: usize,
    /// `None` when `support` is zero
    pub recall: Option<f64>,
}

/// A test player whose main position was missed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Misclassification {
    pub player: String,
    pub actual: Position,
    pub predicted: Position,
    pub listed: Vec<Position>,
    /// The prediction is another of the player's credited positions
    pub matched_listed: bool,
}

/// Everything measured for one model on the test partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub n_test: usize,
    pub accuracy: f64,
    pub kappa: f64,
    pub total_accuracy: f64,
    pub confusion: ConfusionMatrix,
    /// One entry per canonical position, in class-index order
    pub per_class: Vec<ClassRecall>,
    pub misclassified: Vec<Misclassification>,
}

impl Evaluation {
    /// Score `predicted` class indices against the test players they
    /// belong to.
    pub fn evaluate(predicted: &[usize], players: &[&PlayerRecord]) -> Result<Self> {
        if predicted.len() != players.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} predictions", players.len()),
                actual: format!("{} predictions", predicted.len()),
            });
        }
        if players.is_empty() {
            return Err(AnalysisError::DataError("empty test partition".to_string()));
        }

        let actual: Vec<usize> = players.iter().map(|p| p.main_position.index()).collect();
        let credited: Vec<Vec<usize>> = players
            .iter()
            .map(|p| p.credited_positions().iter().map(|c| c.index()).collect())
            .collect();

        let confusion = ConfusionMatrix::from_labels(predicted, &actual, N_POSITIONS)?;
        let support = confusion.actual_totals();
        let per_class = Position::ALL
            .iter()
            .map(|&position| ClassRecall {
                position,
                support: support[position.index()],
                recall: confusion.recall(position.index()),
            })
            .collect();

        let mut misclassified = Vec::new();
        for ((player, &p), allowed) in players.iter().zip(predicted).zip(&credited) {
            if p == player.main_position.index() {
                continue;
            }
            let predicted = Position::from_index(p).ok_or_else(|| AnalysisError::InvalidParameter {
                name: "prediction".to_string(),
                value: p.to_string(),
                reason: "not a position index".to_string(),
            })?;
            misclassified.push(Misclassification {
                player: player.player.clone(),
                actual: player.main_position,
                predicted,
                listed: player.positions.clone(),
                matched_listed: allowed.contains(&p),
            });
        }

        Ok(Self {
            n_test: players.len(),
            accuracy: confusion.accuracy(),
            kappa: confusion.kappa(),
            total_accuracy: total_accuracy(predicted, &credited)?,
            confusion,
            per_class,
            misclassified,
        })
    }

    /// Recall of one position, `None` if it had no test rows
    pub fn recall(&self, position: Position) -> Option<f64> {
        self.per_class[position.index()].recall
    }
}
