//! Observation Types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::FetchError;

/// Fixed point the pipeline observes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    /// Display name used in logs
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: "Karachi".to_string(),
            latitude: 24.8607,
            longitude: 67.0011,
        }
    }
}

/// Inclusive time range for historical queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, rejecting inverted bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FetchError> {
        if end < start {
            return Err(FetchError::InvalidRange(format!(
                "end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering the last `days` days up to `now`
    pub fn lookback(now: DateTime<Utc>, days: i64) -> Result<Self, FetchError> {
        let start = TimeDelta::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                FetchError::Configuration(format!("lookback of {} days is out of range", days))
            })?;
        Self::new(start, now)
    }

    /// Check whether a timestamp falls inside the range
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Hourly air-pollution record as reported by the provider.
///
/// Components the provider omitted stay `None`; validation and the merger
/// decide what to do with incomplete records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionRecord {
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    /// Fine particulate matter (µg/m³)
    pub pm2_5: Option<f64>,
    /// Coarse particulate matter (µg/m³)
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub nh3: Option<f64>,
    /// Provider air-quality index (1 = good .. 5 = very poor)
    pub aqi: Option<u8>,
}

impl PollutionRecord {
    /// Pollutant snapshot, available only when PM2.5 is present
    pub fn pollutants(&self) -> Option<Pollutants> {
        Some(Pollutants {
            pm2_5: self.pm2_5?,
            pm10: self.pm10,
            no2: self.no2,
            so2: self.so2,
            co: self.co,
            o3: self.o3,
            nh3: self.nh3,
            aqi: self.aqi,
        })
    }
}

/// Pollutant concentrations with PM2.5 guaranteed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    pub pm2_5: f64,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub nh3: Option<f64>,
    pub aqi: Option<u8>,
}

/// Hourly weather record as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    /// Air temperature at 2 m (°C)
    pub temperature: Option<f64>,
    /// Relative humidity at 2 m (%)
    pub humidity: Option<f64>,
    /// Mean sea-level pressure (hPa)
    pub pressure: Option<f64>,
    /// Wind speed at 10 m (km/h)
    pub windspeed: Option<f64>,
    /// Wind direction at 10 m (°)
    pub winddirection: Option<f64>,
    /// Hourly precipitation (mm)
    pub precipitation: Option<f64>,
}

impl WeatherRecord {
    /// Names of the weather variables every usable record must carry
    pub const REQUIRED_FIELDS: [&'static str; 6] = [
        "temperature",
        "humidity",
        "pressure",
        "windspeed",
        "winddirection",
        "precipitation",
    ];

    /// Value of a weather variable by name
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "temperature" => self.temperature,
            "humidity" => self.humidity,
            "pressure" => self.pressure,
            "windspeed" => self.windspeed,
            "winddirection" => self.winddirection,
            "precipitation" => self.precipitation,
            _ => None,
        }
    }

    /// Complete conditions, or the name of the first missing variable
    pub fn conditions(&self) -> Result<WeatherConditions, &'static str> {
        Ok(WeatherConditions {
            temperature: self.temperature.ok_or("temperature")?,
            humidity: self.humidity.ok_or("humidity")?,
            pressure: self.pressure.ok_or("pressure")?,
            windspeed: self.windspeed.ok_or("windspeed")?,
            winddirection: self.winddirection.ok_or("winddirection")?,
            precipitation: self.precipitation.ok_or("precipitation")?,
        })
    }
}

/// Weather variables with every field present
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub windspeed: f64,
    pub winddirection: f64,
    pub precipitation: f64,
}

/// Joined observation consumed by the predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub weather: WeatherConditions,
    /// Present when a pollution reading exists for the same hour
    pub pollutants: Option<Pollutants>,
}
