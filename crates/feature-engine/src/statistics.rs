//! Statistical Features Computation

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Hourly series keyed by timestamp
pub type HourlySeries = BTreeMap<DateTime<Utc>, f64>;

/// Rolling aggregates over a window of PM2.5 values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticalFeatures {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl StatisticalFeatures {
    /// Mean and spread of `values`; both zero when empty
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;

        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Values of `series` in the trailing `hours`-hour window ending at `end` (inclusive)
    pub fn trailing_window(series: &HourlySeries, end: DateTime<Utc>, hours: u32) -> Vec<f64> {
        if hours == 0 {
            return Vec::new();
        }
        let start = end - Duration::hours(i64::from(hours) - 1);
        series.range(start..=end).map(|(_, v)| *v).collect()
    }

    /// Value exactly `hours` before `at`, if recorded
    pub fn lag(series: &HourlySeries, at: DateTime<Utc>, hours: u32) -> Option<f64> {
        series.get(&(at - Duration::hours(i64::from(hours)))).copied()
    }

    /// Minimum samples required before a rolling aggregate over `hours` is defined
    pub fn min_periods(hours: u32) -> usize {
        (hours as usize).div_ceil(2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_mean_computation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let stats = StatisticalFeatures::compute(&values);
        assert!((stats.mean - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_std_dev_computation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = StatisticalFeatures::compute(&values);
        // Std dev should be ~2.0 for this dataset
        assert!((stats.std_dev - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_empty_values() {
        let values: Vec<f64> = vec![];
        assert_eq!(
            StatisticalFeatures::compute(&values),
            StatisticalFeatures::default()
        );
    }

    #[test]
    fn test_trailing_window_and_lag() {
        let series: HourlySeries = [(at(0), 10.0), (at(1), 20.0), (at(3), 40.0)]
            .into_iter()
            .collect();

        assert_eq!(
            StatisticalFeatures::trailing_window(&series, at(3), 3),
            vec![20.0, 40.0]
        );
        assert_eq!(StatisticalFeatures::lag(&series, at(3), 2), Some(20.0));
        assert_eq!(StatisticalFeatures::lag(&series, at(3), 1), None);
        assert_eq!(StatisticalFeatures::min_periods(24), 12);
        assert_eq!(StatisticalFeatures::min_periods(3), 2);
        assert_eq!(StatisticalFeatures::min_periods(1), 1);
    }
}
