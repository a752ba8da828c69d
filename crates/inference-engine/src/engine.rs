//! Inference Engine Implementation

use crate::InferenceError;
use aq_fetcher::{Observation, PollutionRecord};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use feature_engine::{
    clamp_aqi, pm25_to_aqi, AqiCategory, FeatureBuilder, FeatureConfig, FeatureRow, Target,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trainer::{ModelArtifact, ModelKind, Regressor, TrainedModel};

/// Predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Artifacts older than this are refused (hours)
    pub max_model_age_hours: i64,
    /// Feed each PM2.5 prediction back as history for later hours of a series
    pub recursive: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_model_age_hours: 168,
            recursive: true,
        }
    }
}

/// Forecast for one hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Hour the prediction is for; equals the observation timestamp
    pub timestamp: DateTime<Utc>,
    pub target: Target,
    /// Raw model output in target units
    pub predicted_value: f64,
    /// US EPA AQI (0-500)
    pub predicted_aqi: u16,
    pub category: AqiCategory,
    pub model_version: u32,
    pub model_kind: ModelKind,
    pub created_at: DateTime<Utc>,
}

/// Runs a trained artifact over observations
pub struct InferenceEngine {
    artifact: ModelArtifact,
    model: TrainedModel,
    builder: FeatureBuilder,
    recursive: bool,
    /// Stamped on every forecast this engine produces
    created_at: DateTime<Utc>,
}

impl InferenceEngine {
    /// Decode an artifact, refusing it when older than the configured age.
    ///
    /// `now` is also the creation time recorded on every forecast.
    pub fn load(
        artifact: ModelArtifact,
        config: &PredictionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, InferenceError> {
        let age = artifact.age(now);
        let max_age = TimeDelta::try_hours(config.max_model_age_hours).ok_or_else(|| {
            InferenceError::Configuration(format!(
                "max_model_age_hours {} is out of range",
                config.max_model_age_hours
            ))
        })?;
        if age > max_age {
            return Err(InferenceError::StaleModel {
                age_hours: age.num_hours(),
                max_age_hours: config.max_model_age_hours,
            });
        }

        let model = artifact
            .model()
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;
        if !model.is_fitted() {
            return Err(InferenceError::ModelLoadError(format!(
                "{} artifact v{} holds an unfitted model",
                artifact.kind, artifact.version
            )));
        }

        let features = FeatureConfig::for_features(
            &artifact.features,
            artifact.target,
            artifact.horizon_hours,
        )?;

        info!(
            "Loaded {} model v{} ({} features, trained {})",
            artifact.kind,
            artifact.version,
            artifact.features.len(),
            artifact.trained_at
        );

        Ok(Self {
            artifact,
            model,
            builder: FeatureBuilder::new(features),
            recursive: config.recursive,
            created_at: now,
        })
    }

    /// Predict the target for one observation.
    ///
    /// `history` supplies past pollution for lag and rolling features.
    pub fn predict(
        &self,
        observation: &Observation,
        history: &[PollutionRecord],
    ) -> Result<Forecast, InferenceError> {
        let row = self.builder.row_for_observation(observation, history);
        let value = self.predict_row(&row)?;
        self.forecast(observation.timestamp, value)
    }

    /// Predict every observation of a forecast horizon, in timestamp order
    pub fn predict_series(
        &self,
        observations: &[Observation],
        history: &[PollutionRecord],
    ) -> Result<Vec<Forecast>, InferenceError> {
        let mut ordered: Vec<&Observation> = observations.iter().collect();
        ordered.sort_by_key(|o| o.timestamp);

        let feed_back = self.recursive
            && self.artifact.target == Target::Pm25
            && self.artifact.horizon_hours == 0;
        let mut working = history.to_vec();
        // measured hours are never overwritten by a prediction
        let measured: HashSet<DateTime<Utc>> = history
            .iter()
            .filter(|r| r.pm2_5.is_some())
            .map(|r| r.timestamp)
            .collect();
        let mut forecasts = Vec::with_capacity(ordered.len());

        for observation in ordered {
            let forecast = self.predict(observation, &working)?;
            if feed_back
                && observation.pollutants.is_none()
                && !measured.contains(&observation.timestamp)
            {
                working.push(PollutionRecord {
                    timestamp: observation.timestamp,
                    location: observation.location.clone(),
                    pm2_5: Some(forecast.predicted_value.max(0.0)),
                    pm10: None,
                    no2: None,
                    so2: None,
                    co: None,
                    o3: None,
                    nh3: None,
                    aqi: None,
                });
            }
            forecasts.push(forecast);
        }

        debug!("Predicted {} forecast hours", forecasts.len());
        Ok(forecasts)
    }

    /// Loaded artifact
    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Pollution history (hours) the artifact's lag and rolling features reach back
    pub fn history_hours(&self) -> u32 {
        let config = self.builder.config();
        config
            .lags
            .iter()
            .chain(&config.rolling_windows)
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn predict_row(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let mut values = Vec::with_capacity(self.artifact.features.len());
        for name in &self.artifact.features {
            match row.feature(name)? {
                Some(v) => values.push(v),
                None => {
                    return Err(InferenceError::MissingFeature {
                        feature: name.clone(),
                        timestamp: row.timestamp,
                    })
                }
            }
        }

        let value = self.model.predict_row(Array1::from(values).view());
        if !value.is_finite() {
            return Err(InferenceError::NonFinitePrediction {
                timestamp: row.timestamp,
            });
        }
        Ok(value)
    }

    fn forecast(&self, timestamp: DateTime<Utc>, value: f64) -> Result<Forecast, InferenceError> {
        let aqi = match self.artifact.target {
            Target::Pm25 => pm25_to_aqi(value),
            Target::Aqi => clamp_aqi(value),
        }
        .ok_or(InferenceError::NonFinitePrediction { timestamp })?;

        Ok(Forecast {
            timestamp,
            target: self.artifact.target,
            predicted_value: value,
            predicted_aqi: aqi,
            category: AqiCategory::from_aqi(aqi),
            model_version: self.artifact.version,
            model_kind: self.artifact.kind,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_fetcher::{Location, WeatherConditions};
    use chrono::{Duration, TimeZone};
    use ndarray::{Array1, Array2};
    use proptest::prelude::*;
    use trainer::models::{Ridge, XgBoost, XgBoostParams};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// Ridge fitted to `2 * x + 5` on the named single feature
    fn artifact(feature: &str, target: Target, trained_at: DateTime<Utc>) -> ModelArtifact {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..20).map(|i| 2.0 * i as f64 + 5.0));
        let mut model = TrainedModel::Ridge(Ridge::new(1e-9));
        model.fit(x.view(), y.view()).unwrap();

        ModelArtifact {
            run_id: Uuid::new_v4(),
            version: 3,
            rank: 1,
            kind: ModelKind::Ridge,
            target,
            horizon_hours: 0,
            features: vec![feature.to_string()],
            params: model.to_bytes().unwrap(),
            rmse: 0.0,
            mae: 0.0,
            r2: 1.0,
            cv_r2: None,
            trained_at,
        }
    }

    fn observation(hour: u32) -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            location: Location::default(),
            weather: WeatherConditions {
                temperature: 30.0,
                humidity: 60.0,
                pressure: 1005.0,
                windspeed: 12.0,
                winddirection: 240.0,
                precipitation: 0.0,
            },
            pollutants: None,
        }
    }

    fn history(hour: u32, pm2_5: f64) -> PollutionRecord {
        PollutionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            location: Location::default(),
            pm2_5: Some(pm2_5),
            pm10: None,
            no2: None,
            so2: None,
            co: None,
            o3: None,
            nh3: None,
            aqi: None,
        }
    }

    #[test]
    fn test_predict_keeps_observation_timestamp() {
        let engine = InferenceEngine::load(
            artifact("hour", Target::Pm25, now()),
            &PredictionConfig::default(),
            now(),
        )
        .unwrap();

        let obs = observation(10);
        let forecast = engine.predict(&obs, &[]).unwrap();

        assert_eq!(forecast.timestamp, obs.timestamp);
        assert!((forecast.predicted_value - 25.0).abs() < 1e-6);
        assert_eq!(forecast.predicted_aqi, pm25_to_aqi(25.0).unwrap());
        assert_eq!(forecast.category, AqiCategory::Moderate);
        assert_eq!(forecast.model_version, 3);
        assert_eq!(forecast.created_at, now());
    }

    #[test]
    fn test_stale_model_refused() {
        let trained_at = now() - Duration::hours(200);
        let result = InferenceEngine::load(
            artifact("hour", Target::Pm25, trained_at),
            &PredictionConfig::default(),
            now(),
        );
        assert!(matches!(
            result,
            Err(InferenceError::StaleModel {
                age_hours: 200,
                max_age_hours: 168
            })
        ));
    }

    #[test]
    fn test_missing_feature_reported() {
        let engine = InferenceEngine::load(
            artifact("pm2_5_lag_1h", Target::Pm25, now()),
            &PredictionConfig::default(),
            now(),
        )
        .unwrap();

        let result = engine.predict(&observation(10), &[]);
        assert!(matches!(
            result,
            Err(InferenceError::MissingFeature { ref feature, .. }) if feature == "pm2_5_lag_1h"
        ));

        let forecast = engine.predict(&observation(10), &[history(9, 4.0)]).unwrap();
        assert!((forecast.predicted_value - 13.0).abs() < 1e-6);
    }

    #[test]
    fn test_series_feeds_predictions_back() {
        let engine = InferenceEngine::load(
            artifact("pm2_5_lag_1h", Target::Pm25, now()),
            &PredictionConfig::default(),
            now(),
        )
        .unwrap();

        let observations = vec![observation(12), observation(11), observation(10)];
        let forecasts = engine
            .predict_series(&observations, &[history(9, 1.0)])
            .unwrap();

        assert_eq!(forecasts.len(), 3);
        assert_eq!(forecasts[0].timestamp, observation(10).timestamp);
        // 1 -> 7 -> 19 -> 43
        assert!((forecasts[0].predicted_value - 7.0).abs() < 1e-6);
        assert!((forecasts[1].predicted_value - 19.0).abs() < 1e-6);
        assert!((forecasts[2].predicted_value - 43.0).abs() < 1e-6);
    }

    #[test]
    fn test_aqi_target_clamped() {
        let engine = InferenceEngine::load(
            artifact("temperature", Target::Aqi, now()),
            &PredictionConfig::default(),
            now(),
        )
        .unwrap();

        let forecast = engine.predict(&observation(0), &[]).unwrap();
        assert_eq!(forecast.predicted_aqi, 65);
        assert_eq!(forecast.target, Target::Aqi);
    }

    #[test]
    fn test_corrupt_params_rejected() {
        let mut bad = artifact("hour", Target::Pm25, now());
        bad.params = vec![0xff; 3];
        assert!(matches!(
            InferenceEngine::load(bad, &PredictionConfig::default(), now()),
            Err(InferenceError::ModelLoadError(_))
        ));

        let mut mismatched = artifact("hour", Target::Pm25, now());
        mismatched.kind = ModelKind::XgBoost;
        assert!(InferenceEngine::load(mismatched, &PredictionConfig::default(), now()).is_err());
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let result = InferenceEngine::load(
            artifact("visibility", Target::Pm25, now()),
            &PredictionConfig::default(),
            now(),
        );
        assert!(matches!(result, Err(InferenceError::UnknownFeature(_))));
    }

    #[test]
    fn test_unfitted_model_rejected() {
        let mut unfitted = artifact("hour", Target::Pm25, now());
        unfitted.kind = ModelKind::XgBoost;
        unfitted.params = TrainedModel::XgBoost(XgBoost::new(XgBoostParams::default()))
            .to_bytes()
            .unwrap();
        assert!(matches!(
            InferenceEngine::load(unfitted, &PredictionConfig::default(), now()),
            Err(InferenceError::ModelLoadError(_))
        ));
    }

    #[test]
    fn test_series_keeps_measured_history() {
        let engine = InferenceEngine::load(
            artifact("pm2_5_lag_1h", Target::Pm25, now()),
            &PredictionConfig::default(),
            now(),
        )
        .unwrap();

        // hour 10 is both forecast and already measured
        let observations = vec![observation(10), observation(11)];
        let forecasts = engine
            .predict_series(&observations, &[history(9, 5.0), history(10, 100.0)])
            .unwrap();

        assert!((forecasts[0].predicted_value - 15.0).abs() < 1e-6);
        assert!((forecasts[1].predicted_value - 205.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_max_age_rejected() {
        let config = PredictionConfig {
            max_model_age_hours: i64::MAX,
            ..Default::default()
        };
        let result = InferenceEngine::load(artifact("hour", Target::Pm25, now()), &config, now());
        assert!(matches!(result, Err(InferenceError::Configuration(_))));
    }

    #[test]
    fn test_series_shares_creation_time() {
        let created = now() + Duration::minutes(7);
        let engine = InferenceEngine::load(
            artifact("hour", Target::Pm25, now()),
            &PredictionConfig::default(),
            created,
        )
        .unwrap();

        let forecasts = engine
            .predict_series(&[observation(1), observation(2), observation(3)], &[])
            .unwrap();
        assert!(forecasts.iter().all(|f| f.created_at == created));
    }

    proptest! {
        #[test]
        fn prop_forecast_timestamps_follow_observations(
            offsets in prop::collection::btree_set(0i64..200_000, 1..24),
            levels in prop::collection::vec(0.0f64..400.0, 0..48),
        ) {
            let engine = InferenceEngine::load(
                artifact("hour", Target::Pm25, now()),
                &PredictionConfig::default(),
                now(),
            )
            .unwrap();
            let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

            let mut observations: Vec<Observation> = offsets
                .iter()
                .map(|h| Observation {
                    timestamp: base + Duration::hours(*h),
                    ..observation(0)
                })
                .collect();
            observations.reverse();
            let history: Vec<PollutionRecord> = levels
                .iter()
                .enumerate()
                .map(|(i, v)| PollutionRecord {
                    timestamp: base + Duration::hours(i as i64),
                    pm2_5: Some(*v),
                    ..history(0, 0.0)
                })
                .collect();

            for obs in &observations {
                let forecast = engine.predict(obs, &history).unwrap();
                prop_assert_eq!(forecast.timestamp, obs.timestamp);
            }

            let forecasts = engine.predict_series(&observations, &history).unwrap();
            let expected: Vec<DateTime<Utc>> =
                offsets.iter().map(|h| base + Duration::hours(*h)).collect();
            let actual: Vec<DateTime<Utc>> = forecasts.iter().map(|f| f.timestamp).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
