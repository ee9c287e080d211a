//! Data preparation for the model families
//!
//! - Feature selection per model family ([`FeatureSet`])
//! - Z-score scaling fitted on one partition ([`StandardScaler`])
//! - Seeded stratified train/test partitioning ([`stratified_split`])

mod scaler;
pub mod features;
pub mod split;

pub use features::{Feature, FeatureSet, CLUSTER_METRICS, SVM_FEATURES};
pub use scaler::StandardScaler;
pub use split::{stratified_split, ClassSplit, Partition};
