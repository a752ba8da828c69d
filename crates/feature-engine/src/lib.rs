//! Feature Engineering Engine
//!
//! Joins pollution and weather history, derives calendar, lag and rolling
//! features, and maps PM2.5 onto the US AQI scale.

mod aqi;
mod error;
mod features;
mod merger;
mod statistics;

pub use aqi::{clamp_aqi, pm25_to_aqi, AqiCategory, MAX_AQI};
pub use error::MergeError;
pub use features::{
    lag_feature_name, rolling_mean_feature_name, rolling_std_feature_name, FeatureBuilder,
    FeatureConfig, FeatureRow, JoinedRecord, Target, BASE_FEATURES, DEFAULT_MODEL_FEATURES,
};
pub use merger::Merger;
pub use statistics::{HourlySeries, StatisticalFeatures};
