//! Record Validator for Range Checking

use crate::error::ValidationError;
use aq_fetcher::{PollutionRecord, WeatherRecord};
use serde::{Deserialize, Serialize};

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Particulate and gas concentration range (µg/m³)
    pub concentration_range: (f64, f64),
    /// CO concentration range (µg/m³), reported far higher than other gases
    pub co_range: (f64, f64),
    /// Provider air-quality index range
    pub provider_aqi_range: (f64, f64),
    /// Temperature range (°C)
    pub temperature_range: (f64, f64),
    /// Relative humidity range (%)
    pub humidity_range: (f64, f64),
    /// Sea-level pressure range (hPa)
    pub pressure_range: (f64, f64),
    /// Wind speed range (km/h)
    pub windspeed_range: (f64, f64),
    /// Wind direction range (°)
    pub winddirection_range: (f64, f64),
    /// Hourly precipitation range (mm)
    pub precipitation_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            concentration_range: (0.0, 10_000.0),
            co_range: (0.0, 100_000.0),
            provider_aqi_range: (1.0, 5.0),
            temperature_range: (-60.0, 60.0),
            humidity_range: (0.0, 100.0),
            pressure_range: (850.0, 1100.0),
            windspeed_range: (0.0, 400.0),
            winddirection_range: (0.0, 360.0),
            precipitation_range: (0.0, 500.0),
        }
    }
}

/// Result of validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all values are valid
    pub valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// Number of fields validated
    pub fields_checked: usize,
}

impl ValidationResult {
    fn from_checks(errors: Vec<ValidationError>, fields_checked: usize) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            fields_checked,
        }
    }

    /// Human-readable summary of every violation
    pub fn describe(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Data validator for pollution and weather records
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field });
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a pollution record; PM2.5 is required, other components optional
    pub fn validate_pollution(&self, record: &PollutionRecord) -> ValidationResult {
        let c = &self.config;
        let checks: [(&'static str, Option<f64>, (f64, f64), bool); 8] = [
            ("pm2_5", record.pm2_5, c.concentration_range, true),
            ("pm10", record.pm10, c.concentration_range, false),
            ("no2", record.no2, c.concentration_range, false),
            ("so2", record.so2, c.concentration_range, false),
            ("co", record.co, c.co_range, false),
            ("o3", record.o3, c.concentration_range, false),
            ("nh3", record.nh3, c.concentration_range, false),
            (
                "aqi",
                record.aqi.map(f64::from),
                c.provider_aqi_range,
                false,
            ),
        ];
        self.run_checks(&checks)
    }

    /// Validate a weather record; every variable is required
    pub fn validate_weather(&self, record: &WeatherRecord) -> ValidationResult {
        let c = &self.config;
        let checks: [(&'static str, Option<f64>, (f64, f64), bool); 6] = [
            ("temperature", record.temperature, c.temperature_range, true),
            ("humidity", record.humidity, c.humidity_range, true),
            ("pressure", record.pressure, c.pressure_range, true),
            ("windspeed", record.windspeed, c.windspeed_range, true),
            (
                "winddirection",
                record.winddirection,
                c.winddirection_range,
                true,
            ),
            (
                "precipitation",
                record.precipitation,
                c.precipitation_range,
                true,
            ),
        ];
        self.run_checks(&checks)
    }

    fn run_checks(
        &self,
        checks: &[(&'static str, Option<f64>, (f64, f64), bool)],
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut fields_checked = 0;

        for &(field, value, range, required) in checks {
            match value {
                Some(v) => {
                    fields_checked += 1;
                    if let Err(e) = self.validate_range(field, v, range) {
                        errors.push(e);
                    }
                }
                None if required => errors.push(ValidationError::MissingField(field)),
                None => {}
            }
        }

        ValidationResult::from_checks(errors, fields_checked)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
