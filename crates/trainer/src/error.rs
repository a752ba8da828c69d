//! Trainer Error Types

use feature_engine::MergeError;
use thiserror::Error;

/// Errors during training and model encoding
#[derive(Debug, Error)]
pub enum TrainError {
    /// Too few usable rows to train and validate
    #[error("Insufficient data: {required} usable rows required, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Every candidate produced an undefined validation metric
    #[error("No valid model: every candidate scored a non-finite RMSE")]
    NoValidModel,

    /// Rejected training configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Feature selection could not be resolved
    #[error("Feature error: {0}")]
    Feature(#[from] MergeError),

    /// Design matrix and labels disagree
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// Model parameters could not be (de)serialized
    #[error("Model encoding failed: {0}")]
    Encoding(String),
}
