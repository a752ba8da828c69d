//! Hourly Weather Client (Open-Meteo)

use crate::client::{FetchConfig, HttpClient};
use crate::error::FetchError;
use crate::types::{DateRange, Location, WeatherRecord};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

/// Hourly variables requested from the provider, in response order
const HOURLY_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,pressure_msl,windspeed_10m,winddirection_10m,precipitation";

/// Provider timestamp format (no offset, always requested in UTC)
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    hourly: HourlyColumns,
}

#[derive(Debug, Deserialize)]
struct HourlyColumns {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pressure_msl: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m: Vec<Option<f64>>,
    #[serde(default)]
    winddirection_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

impl HourlyColumns {
    /// Convert the column-oriented payload into records.
    ///
    /// A column the provider omitted entirely is treated as all-missing; a
    /// column of the wrong length is a decode error.
    fn into_records(self, location: &Location) -> Result<Vec<WeatherRecord>, FetchError> {
        let n = self.time.len();
        let columns = [
            ("temperature_2m", &self.temperature_2m),
            ("relative_humidity_2m", &self.relative_humidity_2m),
            ("pressure_msl", &self.pressure_msl),
            ("windspeed_10m", &self.windspeed_10m),
            ("winddirection_10m", &self.winddirection_10m),
            ("precipitation", &self.precipitation),
        ];
        for (name, column) in columns {
            if !column.is_empty() && column.len() != n {
                return Err(FetchError::Decode(format!(
                    "column {} has {} values, expected {}",
                    name,
                    column.len(),
                    n
                )));
            }
        }

        let at = |column: &Vec<Option<f64>>, i: usize| column.get(i).copied().flatten();

        self.time
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let timestamp = NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
                    .map_err(|e| FetchError::Decode(format!("bad time {:?}: {}", raw, e)))?
                    .and_utc();
                Ok(WeatherRecord {
                    timestamp,
                    location: location.clone(),
                    temperature: at(&self.temperature_2m, i),
                    humidity: at(&self.relative_humidity_2m, i),
                    pressure: at(&self.pressure_msl, i),
                    windspeed: at(&self.windspeed_10m, i),
                    winddirection: at(&self.winddirection_10m, i),
                    precipitation: at(&self.precipitation, i),
                })
            })
            .collect()
    }
}

/// Client for historical and forecast hourly weather
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: HttpClient,
    archive_url: String,
    forecast_url: String,
}

impl WeatherClient {
    /// Create a new weather client
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new("weather", config)?,
            archive_url: config.weather_archive_url.trim_end_matches('/').to_string(),
            forecast_url: config.weather_forecast_url.trim_end_matches('/').to_string(),
        })
    }

    fn base_query(location: &Location) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("timezone", "GMT".to_string()),
        ]
    }

    /// Fetch historical hourly weather covering every day touched by `range`
    pub async fn fetch_history(
        &self,
        location: &Location,
        range: DateRange,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        let start_date = range.start.date_naive();
        let end_date = range.end.date_naive();
        info!("Fetching historical weather: {} -> {}", start_date, end_date);

        let mut query = Self::base_query(location);
        query.push(("start_date", start_date.format("%Y-%m-%d").to_string()));
        query.push(("end_date", end_date.format("%Y-%m-%d").to_string()));

        let url = format!("{}/v1/archive", self.archive_url);
        let response: WeatherResponse = self.http.get_json(&url, &query).await?;
        let records = response.hourly.into_records(location)?;

        info!("Weather rows fetched: {}", records.len());
        Ok(records)
    }

    /// Fetch the hourly weather forecast for the next `days` days
    pub async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        info!("Fetching {}-day weather forecast for {}", days, location.name);

        let mut query = Self::base_query(location);
        query.push(("forecast_days", days.to_string()));

        let url = format!("{}/v1/forecast", self.forecast_url);
        let response: WeatherResponse = self.http.get_json(&url, &query).await?;
        let records = response.hourly.into_records(location)?;

        info!("Forecast hours fetched: {}", records.len());
        Ok(records)
    }
}

/// Current time truncated to the hour, the resolution of both providers
pub fn current_hour() -> chrono::DateTime<Utc> {
    use chrono::{DurationRound, TimeDelta};
    let now = Utc::now();
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn config(url: String) -> FetchConfig {
        FetchConfig {
            weather_archive_url: url.clone(),
            weather_forecast_url: url,
            max_retries: 0,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_history_renames_columns() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "latitude": 24.875, "longitude": 67.0,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [18.4, 17.9],
                "relative_humidity_2m": [55.0, 58.0],
                "pressure_msl": [1016.2, 1016.0],
                "windspeed_10m": [7.2, null],
                "winddirection_10m": [40.0, 45.0],
                "precipitation": [0.0, 0.0]
            }
        }"#;
        let mock = server
            .mock("GET", "/v1/archive")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start_date".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("end_date".into(), "2024-01-02".into()),
                Matcher::UrlEncoded("timezone".into(), "GMT".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = WeatherClient::new(&config(server.url())).unwrap();
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
        )
        .unwrap();
        let records = client
            .fetch_history(&Location::default(), range)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(records[0].temperature, Some(18.4));
        assert_eq!(records[0].humidity, Some(55.0));
        assert_eq!(records[1].windspeed, None);
    }

    #[tokio::test]
    async fn test_column_length_mismatch_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"hourly": {"time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                                  "temperature_2m": [18.4]}}"#;
        let _mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = WeatherClient::new(&config(server.url())).unwrap();
        let result = client.fetch_forecast(&Location::default(), 4).await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_forecast_omitted_column_is_missing() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"hourly": {"time": ["2024-03-01T00:00"], "temperature_2m": [25.0]}}"#;
        let _mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::UrlEncoded("forecast_days".into(), "4".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = WeatherClient::new(&config(server.url())).unwrap();
        let records = client
            .fetch_forecast(&Location::default(), 4)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].temperature, Some(25.0));
        assert_eq!(records[0].precipitation, None);
    }
}
