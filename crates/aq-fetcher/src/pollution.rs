//! Air-Pollution History Client (OpenWeatherMap)

use crate::client::{FetchConfig, HttpClient};
use crate::error::FetchError;
use crate::types::{DateRange, Location, PollutionRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    list: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    dt: i64,
    main: HistoryMain,
    #[serde(default)]
    components: Components,
}

#[derive(Debug, Deserialize)]
struct HistoryMain {
    aqi: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct Components {
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    no2: Option<f64>,
    so2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    nh3: Option<f64>,
}

/// Client for the air-pollution history endpoint
#[derive(Debug, Clone)]
pub struct PollutionClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl PollutionClient {
    /// Create a new pollution client; requires an API key
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FetchError::Configuration("air-pollution API key is not set".to_string())
            })?;

        Ok(Self {
            http: HttpClient::new("air-pollution", config)?,
            base_url: config.pollution_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Fetch hourly pollution records for `location` within `range`
    pub async fn fetch_history(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<PollutionRecord>, FetchError> {
        info!(
            "Fetching historical pollutants for {} from {} to {}",
            location.name, range.start, range.end
        );

        let url = format!("{}/data/2.5/air_pollution/history", self.base_url);
        let query = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("start", range.start.timestamp().to_string()),
            ("end", range.end.timestamp().to_string()),
            ("appid", self.api_key.clone()),
        ];

        let response: HistoryResponse = self.http.get_json(&url, &query).await?;

        let records: Vec<PollutionRecord> = response
            .list
            .into_iter()
            .filter_map(|item| {
                let Some(timestamp) = DateTime::<Utc>::from_timestamp(item.dt, 0) else {
                    warn!("Skipping pollution item with invalid timestamp {}", item.dt);
                    return None;
                };
                Some(PollutionRecord {
                    timestamp,
                    location: location.clone(),
                    pm2_5: item.components.pm2_5,
                    pm10: item.components.pm10,
                    no2: item.components.no2,
                    so2: item.components.so2,
                    co: item.components.co,
                    o3: item.components.o3,
                    nh3: item.components.nh3,
                    aqi: item.main.aqi,
                })
            })
            .collect();

        info!("Total pollution records fetched: {}", records.len());
        Ok(records)
    }
}
