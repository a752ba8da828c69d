//! AQI Inference Engine
//!
//! Loads trained model artifacts and turns observations into hourly
//! forecasts with US EPA AQI categories.

mod engine;

pub use engine::{Forecast, InferenceEngine, PredictionConfig};

use chrono::{DateTime, Utc};
use feature_engine::MergeError;
use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Stale model: trained {age_hours}h ago, limit is {max_age_hours}h")]
    StaleModel { age_hours: i64, max_age_hours: i64 },
    #[error("Missing feature {feature} at {timestamp}")]
    MissingFeature {
        feature: String,
        timestamp: DateTime<Utc>,
    },
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
    #[error("Non-finite prediction at {timestamp}")]
    NonFinitePrediction { timestamp: DateTime<Utc> },
}

impl From<MergeError> for InferenceError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::UnknownFeature(name) => InferenceError::UnknownFeature(name),
            other => InferenceError::ModelLoadError(other.to_string()),
        }
    }
}
