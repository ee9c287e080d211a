//! Positional analysis of Premier League players
//!
//! This crate loads a season of per-player statistics, folds minor position
//! labels into twelve canonical positions, and asks two questions of the
//! data: which positions look alike statistically, and how well can a
//! player's main position be predicted from their numbers.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Canonical positions, player records, CSV loading
//! - [`preprocessing`] - Feature sets, scaling, stratified splitting
//!
//! ## Analysis
//! - [`clustering`] - Position profiles and hierarchical clustering
//! - [`training`] - SVM, forests, k-NN, bagged trees and LDA
//! - [`evaluation`] - Confusion matrices, kappa, per-class and total accuracy
//! - [`pipeline`] - One end-to-end run over the shared partition
//!
//! ## Services
//! - [`config`] - Run configuration
//! - [`cli`] - Command-line interface
//! - [`utils`] - Stage timing

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod data;
pub mod preprocessing;

// Analysis
pub mod clustering;
pub mod training;
pub mod evaluation;
pub mod pipeline;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{AnalysisError, ErrorKind, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{AnalysisError, ErrorKind, Result};

    // Configuration
    pub use crate::config::AnalysisConfig;

    // Data
    pub use crate::data::{Metric, PlayerLoader, PlayerRecord, PlayerTable, Position, N_POSITIONS};

    // Preprocessing
    pub use crate::preprocessing::{stratified_split, FeatureSet, Partition, StandardScaler};

    // Clustering
    pub use crate::clustering::{cluster_positions, Dendrogram, Linkage, PositionClustering};

    // Training
    pub use crate::training::{Classifier, ModelFamily, ModelSettings, TrainedModel};

    // Evaluation
    pub use crate::evaluation::{ConfusionMatrix, Evaluation};

    // Pipeline
    pub use crate::pipeline::{Analysis, AnalysisReport, FittedModel, ModelOutcome};
}
