//! Pipeline configuration
//!
//! Layered as defaults, then the TOML file, then `AQI_`-prefixed
//! environment variables (`__` separates nesting, e.g.
//! `AQI_TRAINING__MIN_ROWS=72`).

use aq_fetcher::{FetchConfig, Location};
use data_validator::ValidationConfig;
use feature_engine::FeatureConfig;
use inference_engine::PredictionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use storage::StorageConfig;
use trainer::TrainingConfig;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// Environment variable consulted when no pollution API key is configured
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub location: Location,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
    pub features: FeatureConfig,
    pub validation: ValidationConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load from `path` (optional) and the environment
    pub fn load(path: &Path) -> Result<Self, ::config::ConfigError> {
        let mut loaded: Self = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("AQI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        if loaded.fetch.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            loaded.fetch.api_key = std::env::var(API_KEY_ENV).ok();
        }
        Ok(loaded)
    }
}
