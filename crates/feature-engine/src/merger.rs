//! Pollution and Weather Merger

use crate::error::MergeError;
use crate::features::{FeatureBuilder, FeatureConfig, FeatureRow, JoinedRecord};
use crate::statistics::HourlySeries;
use aq_fetcher::{Pollutants, PollutionRecord, WeatherConditions, WeatherRecord};
use chrono::{DateTime, Utc};
use data_validator::{ValidationConfig, Validator};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Joins pollution and weather history into feature rows
pub struct Merger {
    builder: FeatureBuilder,
    validator: Validator,
}

impl Merger {
    /// Create a new merger
    pub fn new(features: FeatureConfig, validation: ValidationConfig) -> Self {
        Self {
            builder: FeatureBuilder::new(features),
            validator: Validator::new(validation),
        }
    }

    /// Inner-join both inputs on timestamp and derive feature rows.
    ///
    /// Invalid records are skipped; when a timestamp repeats, the first
    /// record wins. Output is sorted by timestamp with no duplicates.
    pub fn merge(
        &self,
        pollution: &[PollutionRecord],
        weather: &[WeatherRecord],
    ) -> Result<Vec<FeatureRow>, MergeError> {
        check_schema(pollution, weather)?;

        let pollutants = self.valid_pollution(pollution);
        let conditions = self.valid_weather(weather);

        let series: HourlySeries = pollutants
            .iter()
            .map(|(ts, p)| (*ts, p.pm2_5))
            .collect();

        let joined: Vec<JoinedRecord> = pollutants
            .into_iter()
            .filter_map(|(timestamp, pollutants)| {
                conditions.get(&timestamp).map(|weather| JoinedRecord {
                    timestamp,
                    weather: *weather,
                    pollutants,
                })
            })
            .collect();

        let rows = self.builder.build_rows(&joined, &series);
        info!(
            "Merged {} pollution and {} weather records into {} rows",
            pollution.len(),
            weather.len(),
            rows.len()
        );
        Ok(rows)
    }

    fn valid_pollution(
        &self,
        records: &[PollutionRecord],
    ) -> BTreeMap<DateTime<Utc>, Pollutants> {
        let mut valid = BTreeMap::new();
        let mut duplicates = 0usize;

        for record in records {
            let result = self.validator.validate_pollution(record);
            if !result.valid {
                warn!(
                    "Skipping pollution record at {}: {}",
                    record.timestamp,
                    result.describe()
                );
                continue;
            }
            let Some(pollutants) = record.pollutants() else {
                continue;
            };
            if valid.contains_key(&record.timestamp) {
                duplicates += 1;
                continue;
            }
            valid.insert(record.timestamp, pollutants);
        }

        if duplicates > 0 {
            warn!("Dropped {} duplicate pollution timestamps", duplicates);
        }
        valid
    }

    fn valid_weather(
        &self,
        records: &[WeatherRecord],
    ) -> BTreeMap<DateTime<Utc>, WeatherConditions> {
        let mut valid = BTreeMap::new();
        let mut duplicates = 0usize;

        for record in records {
            let result = self.validator.validate_weather(record);
            if !result.valid {
                warn!(
                    "Skipping weather record at {}: {}",
                    record.timestamp,
                    result.describe()
                );
                continue;
            }
            let Ok(conditions) = record.conditions() else {
                continue;
            };
            if valid.contains_key(&record.timestamp) {
                duplicates += 1;
                continue;
            }
            valid.insert(record.timestamp, conditions);
        }

        if duplicates > 0 {
            warn!("Dropped {} duplicate weather timestamps", duplicates);
        }
        valid
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(FeatureConfig::default(), ValidationConfig::default())
    }
}

/// Fail when a required field is absent from every record of a non-empty input
fn check_schema(pollution: &[PollutionRecord], weather: &[WeatherRecord]) -> Result<(), MergeError> {
    if !pollution.is_empty() && pollution.iter().all(|r| r.pm2_5.is_none()) {
        return Err(MergeError::SchemaMismatch {
            input: "pollution",
            field: "pm2_5",
        });
    }

    if !weather.is_empty() {
        for field in WeatherRecord::REQUIRED_FIELDS {
            if weather.iter().all(|r| r.field(field).is_none()) {
                return Err(MergeError::SchemaMismatch {
                    input: "weather",
                    field,
                });
            }
        }
    }

    Ok(())
}
