//! Observation Source
//!
//! The seam stage runners depend on: one trait, one HTTP implementation.

use crate::client::FetchConfig;
use crate::error::FetchError;
use crate::pollution::PollutionClient;
use crate::types::{DateRange, Location, Observation, PollutionRecord, WeatherRecord};
use crate::weather::WeatherClient;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Anything that can supply pollution and weather records
#[allow(async_fn_in_trait)]
pub trait ObservationSource {
    /// Historical pollution records
    async fn fetch_pollution(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<PollutionRecord>, FetchError>;

    /// Historical weather records
    async fn fetch_weather(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<WeatherRecord>, FetchError>;

    /// Hourly weather forecast for the next `days` days
    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Vec<WeatherRecord>, FetchError>;

    /// Historical observations: weather joined with pollution by timestamp
    async fn fetch_observations(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<Observation>, FetchError> {
        let pollution = self.fetch_pollution(location, range).await?;
        let weather = self.fetch_weather(location, range).await?;
        Ok(join_observations(&pollution, &weather))
    }
}

/// Live HTTP source backed by the two provider clients
#[derive(Debug, Clone)]
pub struct HttpObservationSource {
    pollution: Option<PollutionClient>,
    weather: WeatherClient,
}

impl HttpObservationSource {
    /// Create a source with both providers configured
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            pollution: Some(PollutionClient::new(config)?),
            weather: WeatherClient::new(config)?,
        })
    }

    /// Create a weather-only source (forecasting needs no pollution key)
    pub fn weather_only(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            pollution: None,
            weather: WeatherClient::new(config)?,
        })
    }
}

impl ObservationSource for HttpObservationSource {
    async fn fetch_pollution(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<PollutionRecord>, FetchError> {
        let client = self.pollution.as_ref().ok_or_else(|| {
            FetchError::Configuration("source was created without a pollution client".to_string())
        })?;
        client.fetch_history(location, range).await
    }

    async fn fetch_weather(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        self.weather.fetch_history(location, range).await
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        self.weather.fetch_forecast(location, days).await
    }
}

/// Join weather with pollution on timestamp.
///
/// Every complete weather record yields one observation; pollutants are
/// attached when a pollution record with PM2.5 exists for the same hour.
/// Incomplete weather records are skipped.
pub fn join_observations(
    pollution: &[PollutionRecord],
    weather: &[WeatherRecord],
) -> Vec<Observation> {
    let by_time: HashMap<_, _> = pollution
        .iter()
        .filter_map(|p| p.pollutants().map(|pollutants| (p.timestamp, pollutants)))
        .collect();

    let mut observations: Vec<Observation> = weather
        .iter()
        .filter_map(|w| match w.conditions() {
            Ok(conditions) => Some(Observation {
                timestamp: w.timestamp,
                location: w.location.clone(),
                weather: conditions,
                pollutants: by_time.get(&w.timestamp).cloned(),
            }),
            Err(field) => {
                warn!("Skipping weather record at {}: missing {}", w.timestamp, field);
                None
            }
        })
        .collect();

    observations.sort_by_key(|o| o.timestamp);
    observations.dedup_by_key(|o| o.timestamp);
    debug!("Joined {} observations", observations.len());
    observations
}
