//! Feature Row Assembly

use crate::aqi::pm25_to_aqi;
use crate::error::MergeError;
use crate::statistics::{HourlySeries, StatisticalFeatures};
use aq_fetcher::{Observation, Pollutants, PollutionRecord, WeatherConditions};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Features that come straight from the joined record or its timestamp
pub const BASE_FEATURES: [&str; 14] = [
    "temperature",
    "humidity",
    "pressure",
    "windspeed",
    "winddirection",
    "precipitation",
    "hour",
    "day",
    "month",
    "day_of_week",
    "pm2_5",
    "pm10",
    "aqi",
    "aqi_change",
];

/// Weather and calendar predictors; available for forecast hours too
pub const DEFAULT_MODEL_FEATURES: [&str; 10] = [
    "temperature",
    "humidity",
    "pressure",
    "windspeed",
    "winddirection",
    "precipitation",
    "hour",
    "day",
    "month",
    "day_of_week",
];

/// Name of the PM2.5 lag feature for `hours`
pub fn lag_feature_name(hours: u32) -> String {
    format!("pm2_5_lag_{}h", hours)
}

/// Name of the trailing PM2.5 mean feature for `hours`
pub fn rolling_mean_feature_name(hours: u32) -> String {
    format!("pm2_5_rolling_mean_{}h", hours)
}

/// Name of the trailing PM2.5 standard deviation feature for `hours`
pub fn rolling_std_feature_name(hours: u32) -> String {
    format!("pm2_5_rolling_std_{}h", hours)
}

/// Parsed feature name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureName {
    Base(&'static str),
    Lag(u32),
    RollingMean(u32),
    RollingStd(u32),
}

fn parse_hours(rest: &str) -> Option<u32> {
    rest.strip_suffix('h')?.parse().ok().filter(|h| *h > 0)
}

fn parse_feature(name: &str) -> Result<FeatureName, MergeError> {
    if let Some(base) = BASE_FEATURES.iter().find(|b| **b == name) {
        return Ok(FeatureName::Base(base));
    }
    let parsed = if let Some(rest) = name.strip_prefix("pm2_5_lag_") {
        parse_hours(rest).map(FeatureName::Lag)
    } else if let Some(rest) = name.strip_prefix("pm2_5_rolling_mean_") {
        parse_hours(rest).map(FeatureName::RollingMean)
    } else if let Some(rest) = name.strip_prefix("pm2_5_rolling_std_") {
        parse_hours(rest).map(FeatureName::RollingStd)
    } else {
        None
    };
    parsed.ok_or_else(|| MergeError::UnknownFeature(name.to_string()))
}

/// Regression target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Target {
    /// PM2.5 concentration (µg/m³)
    #[default]
    #[serde(rename = "pm2_5")]
    Pm25,
    /// US EPA AQI derived from PM2.5
    #[serde(rename = "aqi")]
    Aqi,
}

impl Target {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Pm25 => "pm2_5",
            Target::Aqi => "aqi",
        }
    }

    /// Parse the string representation back
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pm2_5" => Some(Target::Pm25),
            "aqi" => Some(Target::Aqi),
            _ => None,
        }
    }

    /// Target value for a PM2.5 reading
    pub fn value_from_pm25(&self, pm2_5: f64) -> Option<f64> {
        match self {
            Target::Pm25 => Some(pm2_5),
            Target::Aqi => pm25_to_aqi(pm2_5).map(f64::from),
        }
    }
}

/// Feature engineering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// PM2.5 lag offsets (hours)
    pub lags: Vec<u32>,
    /// Trailing window lengths for rolling aggregates (hours)
    pub rolling_windows: Vec<u32>,
    /// Label offset from the row timestamp (hours); 0 labels the same hour
    pub horizon_hours: u32,
    /// Regression target
    pub target: Target,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 24],
            rolling_windows: vec![3, 24],
            horizon_hours: 0,
            target: Target::Pm25,
        }
    }
}

impl FeatureConfig {
    /// Ensure every name is produced by this config
    pub fn check_features(&self, names: &[String]) -> Result<(), MergeError> {
        for name in names {
            let known = match parse_feature(name)? {
                FeatureName::Base(_) => true,
                FeatureName::Lag(h) => self.lags.contains(&h),
                FeatureName::RollingMean(h) | FeatureName::RollingStd(h) => {
                    self.rolling_windows.contains(&h)
                }
            };
            if !known {
                return Err(MergeError::UnknownFeature(name.clone()));
            }
        }
        Ok(())
    }

    /// Smallest config that produces every feature in `names`
    pub fn for_features(
        names: &[String],
        target: Target,
        horizon_hours: u32,
    ) -> Result<Self, MergeError> {
        let mut config = Self {
            lags: Vec::new(),
            rolling_windows: Vec::new(),
            horizon_hours,
            target,
        };
        for name in names {
            match parse_feature(name)? {
                FeatureName::Base(_) => {}
                FeatureName::Lag(h) => config.lags.push(h),
                FeatureName::RollingMean(h) | FeatureName::RollingStd(h) => {
                    config.rolling_windows.push(h)
                }
            }
        }
        config.lags.sort_unstable();
        config.lags.dedup();
        config.rolling_windows.sort_unstable();
        config.rolling_windows.dedup();
        Ok(config)
    }
}

/// One row of the feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub weather: WeatherConditions,
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    /// Provider air-quality index (1-5)
    pub aqi: Option<u8>,
    /// Provider index change from the previous row
    pub aqi_change: f64,
    /// Lag and rolling features that were defined at this timestamp
    pub history: BTreeMap<String, f64>,
    /// Target value at `timestamp + horizon`
    pub label: Option<f64>,
}

impl FeatureRow {
    /// Look up a feature by name; `Ok(None)` when it is undefined for this row
    pub fn feature(&self, name: &str) -> Result<Option<f64>, MergeError> {
        let value = match parse_feature(name)? {
            FeatureName::Base(base) => match base {
                "temperature" => Some(self.weather.temperature),
                "humidity" => Some(self.weather.humidity),
                "pressure" => Some(self.weather.pressure),
                "windspeed" => Some(self.weather.windspeed),
                "winddirection" => Some(self.weather.winddirection),
                "precipitation" => Some(self.weather.precipitation),
                "hour" => Some(f64::from(self.hour)),
                "day" => Some(f64::from(self.day)),
                "month" => Some(f64::from(self.month)),
                "day_of_week" => Some(f64::from(self.day_of_week)),
                "pm2_5" => self.pm2_5,
                "pm10" => self.pm10,
                "aqi" => self.aqi.map(f64::from),
                "aqi_change" => Some(self.aqi_change),
                _ => return Err(MergeError::UnknownFeature(name.to_string())),
            },
            FeatureName::Lag(_) | FeatureName::RollingMean(_) | FeatureName::RollingStd(_) => {
                self.history.get(name).copied()
            }
        };
        Ok(value)
    }

    /// Values for `names` in order, or `None` if any is undefined
    pub fn vector(&self, names: &[String]) -> Result<Option<Vec<f64>>, MergeError> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match self.feature(name)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }
}

/// Pollution and weather for one shared timestamp
#[derive(Debug, Clone)]
pub struct JoinedRecord {
    pub timestamp: DateTime<Utc>,
    pub weather: WeatherConditions,
    pub pollutants: Pollutants,
}

/// Derives feature rows from joined records
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    /// Create a new feature builder
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Builder configuration
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Build rows for joined records sorted by timestamp.
    ///
    /// `series` is the PM2.5 history used for lags, rolling aggregates and
    /// labels; it may extend beyond the joined timestamps.
    pub fn build_rows(&self, joined: &[JoinedRecord], series: &HourlySeries) -> Vec<FeatureRow> {
        let mut rows = Vec::with_capacity(joined.len());
        let mut previous_aqi: Option<u8> = None;

        for (i, record) in joined.iter().enumerate() {
            let aqi = record.pollutants.aqi;
            let aqi_change = match (i, previous_aqi, aqi) {
                (0, _, _) => 0.0,
                (_, Some(prev), Some(curr)) => f64::from(curr) - f64::from(prev),
                _ => 0.0,
            };
            previous_aqi = aqi;

            rows.push(self.assemble(
                record.timestamp,
                record.weather,
                Some(&record.pollutants),
                aqi_change,
                series,
                self.label(series, record.timestamp),
            ));
        }

        debug!("Built {} feature rows", rows.len());
        rows
    }

    /// Build the feature row for a single observation.
    ///
    /// History newer than the observation is ignored. The row has no label.
    pub fn row_for_observation(
        &self,
        observation: &Observation,
        history: &[PollutionRecord],
    ) -> FeatureRow {
        let at = observation.timestamp;
        let mut series: HourlySeries = history
            .iter()
            .filter(|r| r.timestamp <= at)
            .filter_map(|r| r.pm2_5.map(|v| (r.timestamp, v)))
            .collect();
        if let Some(p) = &observation.pollutants {
            series.insert(at, p.pm2_5);
        }

        let previous_aqi = history
            .iter()
            .filter(|r| r.timestamp < at)
            .max_by_key(|r| r.timestamp)
            .and_then(|r| r.aqi);
        let aqi_change = match (previous_aqi, observation.pollutants.as_ref().and_then(|p| p.aqi)) {
            (Some(prev), Some(curr)) => f64::from(curr) - f64::from(prev),
            _ => 0.0,
        };

        self.assemble(
            at,
            observation.weather,
            observation.pollutants.as_ref(),
            aqi_change,
            &series,
            None,
        )
    }

    fn assemble(
        &self,
        timestamp: DateTime<Utc>,
        weather: WeatherConditions,
        pollutants: Option<&Pollutants>,
        aqi_change: f64,
        series: &HourlySeries,
        label: Option<f64>,
    ) -> FeatureRow {
        FeatureRow {
            timestamp,
            weather,
            hour: timestamp.hour(),
            day: timestamp.day(),
            month: timestamp.month(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            pm2_5: pollutants.map(|p| p.pm2_5),
            pm10: pollutants.and_then(|p| p.pm10),
            aqi: pollutants.and_then(|p| p.aqi),
            aqi_change,
            history: self.history_features(series, timestamp),
            label,
        }
    }

    fn history_features(&self, series: &HourlySeries, at: DateTime<Utc>) -> BTreeMap<String, f64> {
        let mut features = BTreeMap::new();

        for &h in &self.config.lags {
            if let Some(v) = StatisticalFeatures::lag(series, at, h) {
                features.insert(lag_feature_name(h), v);
            }
        }

        for &h in &self.config.rolling_windows {
            let window = StatisticalFeatures::trailing_window(series, at, h);
            if window.len() >= StatisticalFeatures::min_periods(h) {
                let stats = StatisticalFeatures::compute(&window);
                features.insert(rolling_mean_feature_name(h), stats.mean);
                features.insert(rolling_std_feature_name(h), stats.std_dev);
            }
        }

        features
    }

    fn label(&self, series: &HourlySeries, at: DateTime<Utc>) -> Option<f64> {
        let target_time = at + Duration::hours(i64::from(self.config.horizon_hours));
        series
            .get(&target_time)
            .and_then(|pm2_5| self.config.target.value_from_pm25(*pm2_5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_fetcher::Location;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn weather() -> WeatherConditions {
        WeatherConditions {
            temperature: 22.0,
            humidity: 48.0,
            pressure: 1013.0,
            windspeed: 9.0,
            winddirection: 200.0,
            precipitation: 0.0,
        }
    }

    fn joined(ts: DateTime<Utc>, pm2_5: f64, aqi: u8) -> JoinedRecord {
        JoinedRecord {
            timestamp: ts,
            weather: weather(),
            pollutants: Pollutants {
                pm2_5,
                pm10: Some(pm2_5 * 2.0),
                no2: None,
                so2: None,
                co: None,
                o3: None,
                nh3: None,
                aqi: Some(aqi),
            },
        }
    }

    #[test]
    fn test_calendar_features() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        // 2024-01-03 is a Wednesday
        let record = joined(at(3, 15), 40.0, 3);
        let series: HourlySeries = [(record.timestamp, 40.0)].into_iter().collect();
        let rows = builder.build_rows(&[record], &series);

        assert_eq!(rows[0].hour, 15);
        assert_eq!(rows[0].day, 3);
        assert_eq!(rows[0].month, 1);
        assert_eq!(rows[0].day_of_week, 2);
        assert_eq!(rows[0].label, Some(40.0));
    }

    #[test]
    fn test_aqi_change_and_lags() {
        let config = FeatureConfig {
            lags: vec![1],
            rolling_windows: vec![2],
            ..Default::default()
        };
        let builder = FeatureBuilder::new(config);
        let records = vec![
            joined(at(1, 0), 10.0, 2),
            joined(at(1, 1), 30.0, 4),
            joined(at(1, 3), 50.0, 3),
        ];
        let series: HourlySeries = records
            .iter()
            .map(|r| (r.timestamp, r.pollutants.pm2_5))
            .collect();

        let rows = builder.build_rows(&records, &series);

        assert_eq!(rows[0].aqi_change, 0.0);
        assert_eq!(rows[1].aqi_change, 2.0);
        assert_eq!(rows[2].aqi_change, -1.0);

        assert_eq!(rows[0].feature("pm2_5_lag_1h").unwrap(), None);
        assert_eq!(rows[1].feature("pm2_5_lag_1h").unwrap(), Some(10.0));
        // hour 2 is missing, so the 1h lag at hour 3 is undefined
        assert_eq!(rows[2].feature("pm2_5_lag_1h").unwrap(), None);

        assert_eq!(rows[1].feature("pm2_5_rolling_mean_2h").unwrap(), Some(20.0));
        assert_eq!(rows[2].feature("pm2_5_rolling_mean_2h").unwrap(), Some(50.0));
    }

    #[test]
    fn test_label_at_horizon() {
        let config = FeatureConfig {
            horizon_hours: 1,
            target: Target::Aqi,
            ..Default::default()
        };
        let builder = FeatureBuilder::new(config);
        let records = vec![joined(at(1, 0), 10.0, 1), joined(at(1, 1), 35.4, 2)];
        let series: HourlySeries = records
            .iter()
            .map(|r| (r.timestamp, r.pollutants.pm2_5))
            .collect();

        let rows = builder.build_rows(&records, &series);
        assert_eq!(rows[0].label, Some(100.0));
        assert_eq!(rows[1].label, None);
    }

    #[test]
    fn test_unknown_feature() {
        let row = FeatureBuilder::new(FeatureConfig::default())
            .build_rows(&[joined(at(1, 0), 1.0, 1)], &HourlySeries::new())
            .remove(0);
        assert!(matches!(
            row.feature("visibility"),
            Err(MergeError::UnknownFeature(_))
        ));
        assert!(matches!(
            row.feature("pm2_5_lag_0h"),
            Err(MergeError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_vector_requires_every_feature() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let row = builder
            .build_rows(&[joined(at(1, 0), 12.0, 2)], &HourlySeries::new())
            .remove(0);

        let names: Vec<String> = DEFAULT_MODEL_FEATURES.iter().map(|s| s.to_string()).collect();
        let vector = row.vector(&names).unwrap().unwrap();
        assert_eq!(vector.len(), 10);
        assert_eq!(vector[0], 22.0);

        let with_lag = vec!["hour".to_string(), lag_feature_name(1)];
        assert_eq!(row.vector(&with_lag).unwrap(), None);
    }

    #[test]
    fn test_config_for_features() {
        let names = vec![
            "hour".to_string(),
            lag_feature_name(24),
            rolling_std_feature_name(6),
            rolling_mean_feature_name(6),
            lag_feature_name(1),
        ];
        let config = FeatureConfig::for_features(&names, Target::Pm25, 0).unwrap();
        assert_eq!(config.lags, vec![1, 24]);
        assert_eq!(config.rolling_windows, vec![6]);
        assert!(config.check_features(&names).is_ok());
        assert!(FeatureConfig::default()
            .check_features(&[lag_feature_name(48)])
            .is_err());
    }

    #[test]
    fn test_row_for_forecast_observation() {
        let builder = FeatureBuilder::new(FeatureConfig {
            lags: vec![1],
            rolling_windows: vec![3],
            ..Default::default()
        });
        let history: Vec<PollutionRecord> = (0..3)
            .map(|h| PollutionRecord {
                timestamp: at(1, h),
                location: Location::default(),
                pm2_5: Some(10.0 * f64::from(h + 1)),
                pm10: None,
                no2: None,
                so2: None,
                co: None,
                o3: None,
                nh3: None,
                aqi: Some(2),
            })
            .collect();
        let observation = Observation {
            timestamp: at(1, 3),
            location: Location::default(),
            weather: weather(),
            pollutants: None,
        };

        let row = builder.row_for_observation(&observation, &history);

        assert_eq!(row.timestamp, observation.timestamp);
        assert_eq!(row.pm2_5, None);
        assert_eq!(row.label, None);
        assert_eq!(row.feature("pm2_5_lag_1h").unwrap(), Some(30.0));
        assert_eq!(row.feature("pm2_5_rolling_mean_3h").unwrap(), Some(25.0));
    }
}
