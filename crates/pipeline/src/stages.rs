//! Stage runners

use crate::{PipelineConfig, PipelineError};
use aq_fetcher::{join_observations, DateRange, ObservationSource};
use chrono::{DateTime, Duration, Utc};
use feature_engine::Merger;
use inference_engine::InferenceEngine;
use storage::{CurrentWeather, Repository};
use tracing::info;
use trainer::{ModelKind, Trainer};

/// Outcome of a fetch run
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSummary {
    pub pollution_fetched: usize,
    pub weather_fetched: usize,
    pub pollution_stored: u64,
    pub weather_stored: u64,
    pub feature_rows_stored: u64,
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub version: u32,
    pub best: ModelKind,
    pub rmse: f64,
    pub models_stored: usize,
}

/// Outcome of a prediction run
#[derive(Debug, Clone, PartialEq)]
pub struct PredictSummary {
    pub model_version: u32,
    pub forecasts_stored: u64,
    pub first_hour: DateTime<Utc>,
    pub last_hour: DateTime<Utc>,
}

/// Fetch the lookback window, persist raw records and derive feature rows
pub async fn run_fetch<S: ObservationSource>(
    config: &PipelineConfig,
    source: &S,
    repo: &Repository,
    now: DateTime<Utc>,
) -> Result<FetchSummary, PipelineError> {
    let range = DateRange::lookback(now, config.fetch.lookback_days)?;
    info!(
        "Fetching {} from {} to {}",
        config.location.name, range.start, range.end
    );

    let pollution = source.fetch_pollution(&config.location, range).await?;
    let weather = source.fetch_weather(&config.location, range).await?;

    let pollution_stored = repo.insert_pollution(&pollution).await?;
    let weather_stored = repo.insert_weather(&weather).await?;

    // merge from storage so history fetched by earlier runs feeds lags
    let stored_pollution = repo.pollution_between(range.start, range.end).await?;
    let stored_weather = repo.weather_between(range.start, range.end).await?;
    let merger = Merger::new(config.features.clone(), config.validation.clone());
    let rows = merger.merge(&stored_pollution, &stored_weather)?;
    let feature_rows_stored = repo.insert_feature_rows(&rows).await?;

    let summary = FetchSummary {
        pollution_fetched: pollution.len(),
        weather_fetched: weather.len(),
        pollution_stored,
        weather_stored,
        feature_rows_stored,
    };
    info!("Fetch complete: {:?}", summary);
    Ok(summary)
}

/// Train candidates on every stored feature row and register the run
pub async fn run_train(
    config: &PipelineConfig,
    repo: &Repository,
) -> Result<TrainSummary, PipelineError> {
    let rows = repo.feature_rows().await?;
    info!("Loaded {} feature rows", rows.len());

    let trainer = Trainer::new(config.training.clone(), &config.features)?;
    let mut artifacts = trainer.train(&rows)?;
    let version = repo.insert_model_run(&mut artifacts).await?;

    let best = &artifacts[0];
    let summary = TrainSummary {
        version,
        best: best.kind,
        rmse: best.rmse,
        models_stored: artifacts.len(),
    };
    info!(
        "Model v{} registered: best {} (RMSE {:.4})",
        summary.version, summary.best, summary.rmse
    );
    Ok(summary)
}

/// Forecast the coming days with the best registered model
pub async fn run_predict<S: ObservationSource>(
    config: &PipelineConfig,
    source: &S,
    repo: &Repository,
    now: DateTime<Utc>,
) -> Result<PredictSummary, PipelineError> {
    let artifact = repo.best_model().await?.ok_or(PipelineError::NoModel)?;
    let engine = InferenceEngine::load(artifact, &config.prediction, now)?;

    let forecast_weather = source
        .fetch_forecast(&config.location, config.fetch.forecast_days)
        .await?;
    // incomplete hours are skipped by the join
    let observations = join_observations(&[], &forecast_weather);

    let (Some(first), Some(last)) = (observations.first(), observations.last()) else {
        return Err(PipelineError::EmptyForecast);
    };
    let (first_hour, last_hour) = (first.timestamp, last.timestamp);

    let reach = Duration::hours(i64::from(engine.history_hours()));
    let history = repo.pollution_between(first_hour - reach, first_hour).await?;

    let forecasts = engine.predict_series(&observations, &history)?;
    let forecasts_stored = repo.insert_forecasts(&forecasts).await?;

    repo.replace_current_weather(&CurrentWeather {
        timestamp: first.timestamp,
        location: first.location.clone(),
        weather: first.weather,
        fetched_at: now,
    })
    .await?;

    let summary = PredictSummary {
        model_version: engine.artifact().version,
        forecasts_stored,
        first_hour,
        last_hour,
    };
    info!(
        "Stored {} forecasts from {} to {} with model v{}",
        summary.forecasts_stored, summary.first_hour, summary.last_hour, summary.model_version
    );
    Ok(summary)
}
