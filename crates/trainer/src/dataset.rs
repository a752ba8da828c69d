//! Design matrix assembly from feature rows

use crate::error::TrainError;
use chrono::{DateTime, Utc};
use feature_engine::FeatureRow;
use ndarray::{s, Array1, Array2};
use std::ops::Range;
use tracing::{debug, warn};

/// Time-ordered design matrix with labels
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Column names, in matrix order
    pub features: Vec<String>,
    /// One row per usable feature row
    pub x: Array2<f64>,
    /// Labels aligned with `x`
    pub y: Array1<f64>,
    /// Row timestamps, ascending
    pub timestamps: Vec<DateTime<Utc>>,
}

impl Dataset {
    /// Build from feature rows, dropping rows that lack the label or any feature
    pub fn from_rows(rows: &[FeatureRow], features: &[String]) -> Result<Self, TrainError> {
        let mut sorted: Vec<&FeatureRow> = rows.iter().collect();
        sorted.sort_by_key(|r| r.timestamp);

        let mut values = Vec::with_capacity(sorted.len() * features.len());
        let mut labels = Vec::with_capacity(sorted.len());
        let mut timestamps = Vec::with_capacity(sorted.len());
        let mut dropped = 0usize;

        for row in sorted {
            let label = row.label.filter(|l| l.is_finite());
            match (label, row.vector(features)?) {
                (Some(label), Some(vector)) if vector.iter().all(|v| v.is_finite()) => {
                    values.extend(vector);
                    labels.push(label);
                    timestamps.push(row.timestamp);
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!(
                "Dropped {} of {} rows lacking the label or a selected feature",
                dropped,
                rows.len()
            );
        }

        let x = Array2::from_shape_vec((labels.len(), features.len()), values)
            .map_err(|e| TrainError::Shape(e.to_string()))?;
        debug!("Dataset assembled: {} rows x {} features", x.nrows(), x.ncols());

        Ok(Self {
            features: features.to_vec(),
            x,
            y: Array1::from(labels),
            timestamps,
        })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Whether the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Contiguous row range as a new dataset
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            features: self.features.clone(),
            x: self.x.slice(s![range.clone(), ..]).to_owned(),
            y: self.y.slice(s![range.clone()]).to_owned(),
            timestamps: self.timestamps[range].to_vec(),
        }
    }

    /// Every row except `hold_out`
    pub fn without(&self, hold_out: Range<usize>) -> Self {
        let keep: Vec<usize> = (0..self.len()).filter(|i| !hold_out.contains(i)).collect();
        Self {
            features: self.features.clone(),
            x: self.x.select(ndarray::Axis(0), &keep),
            y: self.y.select(ndarray::Axis(0), &keep),
            timestamps: keep.iter().map(|i| self.timestamps[*i]).collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aq_fetcher::{Location, Observation, WeatherConditions};
    use chrono::{Duration, TimeZone};
    use feature_engine::{FeatureBuilder, FeatureConfig};

    /// Feature rows for `n` consecutive hours with a known label function
    pub(crate) fn synthetic_rows(n: usize, label: impl Fn(f64, f64) -> f64) -> Vec<FeatureRow> {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let temperature = 15.0 + (i % 17) as f64;
                let humidity = 30.0 + ((i * 7) % 50) as f64;
                let observation = Observation {
                    timestamp: start + Duration::hours(i as i64),
                    location: Location::default(),
                    weather: WeatherConditions {
                        temperature,
                        humidity,
                        pressure: 1010.0,
                        windspeed: 10.0,
                        winddirection: 180.0,
                        precipitation: 0.0,
                    },
                    pollutants: None,
                };
                let mut row = builder.row_for_observation(&observation, &[]);
                row.label = Some(label(temperature, humidity));
                row
            })
            .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_drops_incomplete_rows() {
        let mut rows = synthetic_rows(6, |t, _| t);
        rows[1].label = None;
        rows[3].label = Some(f64::NAN);

        let dataset = Dataset::from_rows(&rows, &names(&["temperature", "hour"])).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.x.ncols(), 2);
        assert_eq!(dataset.y[0], rows[0].weather.temperature);
    }

    #[test]
    fn test_missing_feature_drops_row() {
        let rows = synthetic_rows(4, |t, _| t);
        let dataset = Dataset::from_rows(&rows, &names(&["temperature", "pm2_5"])).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_unknown_feature_is_error() {
        let rows = synthetic_rows(2, |t, _| t);
        assert!(matches!(
            Dataset::from_rows(&rows, &names(&["visibility"])),
            Err(TrainError::Feature(_))
        ));
    }

    #[test]
    fn test_slice_and_without() {
        let rows = synthetic_rows(10, |t, _| t);
        let dataset = Dataset::from_rows(&rows, &names(&["temperature"])).unwrap();

        let tail = dataset.slice(8..10);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.timestamps[0], rows[8].timestamp);

        let rest = dataset.without(2..5);
        assert_eq!(rest.len(), 7);
        assert_eq!(rest.timestamps[2], rows[5].timestamp);
    }
}
