//! Air-Quality Observation Fetcher
//!
//! Retrieves hourly air-pollution history and weather (historical and
//! forecast) for a fixed location over HTTP, with retry and backoff for
//! transient failures and rate limiting.

mod client;
mod error;
mod pollution;
mod source;
mod types;
mod weather;

pub use client::{FetchConfig, HttpClient, RetryPolicy};
pub use error::FetchError;
pub use pollution::PollutionClient;
pub use source::{join_observations, HttpObservationSource, ObservationSource};
pub use types::{
    DateRange, Location, Observation, PollutionRecord, Pollutants, WeatherConditions,
    WeatherRecord,
};
pub use weather::{current_hour, WeatherClient};
