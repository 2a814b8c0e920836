//! Feature derivation and recommendation model
//!
//! Features are pure functions of a catalog snapshot; datasets split
//! deterministically by seed; the trained model is held behind the
//! prediction engine and swapped atomically on retrain.

pub mod dataset;
pub mod features;
pub mod model;

pub use dataset::{build_training_dataset, LabeledExample, TrainingDataset};
pub use features::{
    build_features, features_to_csv, label_for, CategoryEncoder, FeatureVector, FEATURE_DIM,
};
pub use model::{Prediction, PredictionEngine};

use thiserror::Error;

/// Minimum labeled examples before training is meaningful.
pub const MIN_TRAINING_EXAMPLES: usize = 10;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("insufficient training data: have {have} labeled examples, need {need}")]
    DataInsufficient { have: usize, need: usize },
    #[error("no model has been trained yet")]
    ModelNotTrained,
    #[error("split ratio {0} outside (0, 1)")]
    InvalidSplitRatio(f64),
    #[error("training failed: {0}")]
    Training(String),
}
