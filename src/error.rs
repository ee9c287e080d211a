//! Error types for the positional analysis

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Degenerate class {class} for {model}: {count} training examples, need at least {required}")]
    DegenerateClass {
        model: String,
        class: String,
        count: usize,
        required: usize,
    },

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse error taxonomy used when reporting per-model failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing or malformed input columns; fatal for the run
    Schema,
    /// A class with too few examples to stratify or fit
    DegenerateClass,
    /// Singular covariance, non-convergence and similar
    Numerical,
    /// Everything else
    Other,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::SchemaError(_) => ErrorKind::Schema,
            AnalysisError::DegenerateClass { .. } => ErrorKind::DegenerateClass,
            AnalysisError::SingularMatrix(_)
            | AnalysisError::ConvergenceError { .. }
            | AnalysisError::ComputationError(_) => ErrorKind::Numerical,
            _ => ErrorKind::Other,
        }
    }
}

impl From<polars::error::PolarsError> for AnalysisError {
    fn from(err: polars::error::PolarsError) -> Self {
        AnalysisError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AnalysisError {
    fn from(err: ndarray::ShapeError) -> Self {
        AnalysisError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
