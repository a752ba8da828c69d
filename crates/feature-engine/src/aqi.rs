//! US EPA Air Quality Index for PM2.5

use serde::{Deserialize, Serialize};

/// (C_low, C_high, I_low, I_high) breakpoints for 24h PM2.5 (µg/m³)
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 500.4, 301.0, 500.0),
];

/// Highest index value on the scale
pub const MAX_AQI: u16 = 500;

/// Convert a PM2.5 concentration to the US AQI.
///
/// The concentration is truncated to 0.1 µg/m³ as the EPA procedure
/// requires, which closes the gaps between breakpoint rows. Negative input
/// clamps to 0 and anything above the last breakpoint caps at 500.
/// Returns `None` only for non-finite input.
pub fn pm25_to_aqi(pm25: f64) -> Option<u16> {
    if !pm25.is_finite() {
        return None;
    }

    let c = (pm25.max(0.0) * 10.0 + 1e-9).floor() / 10.0;

    for (c_low, c_high, i_low, i_high) in PM25_BREAKPOINTS {
        if c <= c_high + 1e-9 {
            let aqi = (i_high - i_low) / (c_high - c_low) * (c.max(c_low) - c_low) + i_low;
            return Some(aqi.round() as u16);
        }
    }

    Some(MAX_AQI)
}

/// Round and clamp a directly predicted AQI onto the 0..=500 scale
pub fn clamp_aqi(value: f64) -> Option<u16> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, MAX_AQI as f64) as u16)
}

/// AQI health category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Category for an index value
    pub fn from_aqi(aqi: u16) -> Self {
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Parse the string representation back
    pub fn parse(label: &str) -> Option<Self> {
        [
            AqiCategory::Good,
            AqiCategory::Moderate,
            AqiCategory::UnhealthyForSensitiveGroups,
            AqiCategory::Unhealthy,
            AqiCategory::VeryUnhealthy,
            AqiCategory::Hazardous,
        ]
        .into_iter()
        .find(|c| c.as_str() == label)
    }
}
