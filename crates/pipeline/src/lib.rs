//! AQI Forecasting Pipeline
//!
//! Wires the fetcher, merger, trainer, predictor and storage into the three
//! stages run by the `fetch-features`, `train-model` and `predict-aqi`
//! binaries.

mod config;
mod stages;

pub use config::{LogFormat, LoggingConfig, PipelineConfig, API_KEY_ENV, DEFAULT_CONFIG_PATH};
pub use stages::{run_fetch, run_predict, run_train, FetchSummary, PredictSummary, TrainSummary};

use aq_fetcher::FetchError;
use feature_engine::MergeError;
use inference_engine::InferenceError;
use storage::StorageError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use trainer::TrainError;

/// Errors surfaced by a pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("Training failed: {0}")]
    Train(#[from] TrainError),
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("No trained model in the registry")]
    NoModel,
    #[error("Weather forecast contained no complete hours")]
    EmptyForecast,
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .expect("Failed to set tracing subscriber");
}
