//! Repository Implementation

use crate::schema::MIGRATIONS;
use crate::StorageError;
use aq_fetcher::{Location, PollutionRecord, WeatherConditions, WeatherRecord};
use chrono::{DateTime, Utc};
use feature_engine::{AqiCategory, FeatureRow, Target};
use inference_engine::Forecast;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use trainer::{ModelArtifact, ModelKind};
use uuid::Uuid;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite connection URL
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/aqi.db".to_string(),
            max_connections: 4,
        }
    }
}

/// First forecast hour of the latest prediction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub weather: WeatherConditions,
    pub fetched_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PollutionRow {
    timestamp: i64,
    location: String,
    latitude: f64,
    longitude: f64,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    no2: Option<f64>,
    so2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    nh3: Option<f64>,
    aqi: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct WeatherRow {
    timestamp: i64,
    location: String,
    latitude: f64,
    longitude: f64,
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    windspeed: Option<f64>,
    winddirection: Option<f64>,
    precipitation: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct FeatureRowRecord {
    data: String,
}

#[derive(sqlx::FromRow)]
struct ModelRow {
    run_id: String,
    version: i64,
    rank: i64,
    kind: String,
    target: String,
    horizon_hours: i64,
    features: String,
    params: Vec<u8>,
    rmse: f64,
    mae: f64,
    r2: f64,
    cv_r2: Option<f64>,
    trained_at: i64,
}

#[derive(sqlx::FromRow)]
struct ForecastRow {
    timestamp: i64,
    target: String,
    predicted_value: f64,
    predicted_aqi: i64,
    category: String,
    model_version: i64,
    model_kind: String,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
struct CurrentWeatherRow {
    timestamp: i64,
    location: String,
    latitude: f64,
    longitude: f64,
    temperature: f64,
    humidity: f64,
    pressure: f64,
    windspeed: f64,
    winddirection: f64,
    precipitation: f64,
    fetched_at: i64,
}

fn to_datetime(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::SerializationError(format!("timestamp out of range: {}", secs)))
}

fn location(name: String, latitude: f64, longitude: f64) -> Location {
    Location {
        name,
        latitude,
        longitude,
    }
}

impl TryFrom<PollutionRow> for PollutionRecord {
    type Error = StorageError;

    fn try_from(row: PollutionRow) -> Result<Self, Self::Error> {
        let aqi = row
            .aqi
            .map(u8::try_from)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        Ok(PollutionRecord {
            timestamp: to_datetime(row.timestamp)?,
            location: location(row.location, row.latitude, row.longitude),
            pm2_5: row.pm2_5,
            pm10: row.pm10,
            no2: row.no2,
            so2: row.so2,
            co: row.co,
            o3: row.o3,
            nh3: row.nh3,
            aqi,
        })
    }
}

impl TryFrom<WeatherRow> for WeatherRecord {
    type Error = StorageError;

    fn try_from(row: WeatherRow) -> Result<Self, Self::Error> {
        Ok(WeatherRecord {
            timestamp: to_datetime(row.timestamp)?,
            location: location(row.location, row.latitude, row.longitude),
            temperature: row.temperature,
            humidity: row.humidity,
            pressure: row.pressure,
            windspeed: row.windspeed,
            winddirection: row.winddirection,
            precipitation: row.precipitation,
        })
    }
}

impl TryFrom<ModelRow> for ModelArtifact {
    type Error = StorageError;

    fn try_from(row: ModelRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, value: &str| {
            StorageError::SerializationError(format!("unknown {} '{}'", what, value))
        };
        let to_u32 = |v: i64| {
            u32::try_from(v).map_err(|e| StorageError::SerializationError(e.to_string()))
        };
        Ok(ModelArtifact {
            run_id: Uuid::parse_str(&row.run_id)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?,
            version: to_u32(row.version)?,
            rank: to_u32(row.rank)?,
            kind: ModelKind::parse(&row.kind).ok_or_else(|| corrupt("model kind", &row.kind))?,
            target: Target::parse(&row.target).ok_or_else(|| corrupt("target", &row.target))?,
            horizon_hours: to_u32(row.horizon_hours)?,
            features: serde_json::from_str(&row.features)?,
            params: row.params,
            rmse: row.rmse,
            mae: row.mae,
            r2: row.r2,
            cv_r2: row.cv_r2,
            trained_at: to_datetime(row.trained_at)?,
        })
    }
}

impl TryFrom<ForecastRow> for Forecast {
    type Error = StorageError;

    fn try_from(row: ForecastRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, value: &str| {
            StorageError::SerializationError(format!("unknown {} '{}'", what, value))
        };
        Ok(Forecast {
            timestamp: to_datetime(row.timestamp)?,
            target: Target::parse(&row.target).ok_or_else(|| corrupt("target", &row.target))?,
            predicted_value: row.predicted_value,
            predicted_aqi: u16::try_from(row.predicted_aqi)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?,
            category: AqiCategory::parse(&row.category)
                .ok_or_else(|| corrupt("category", &row.category))?,
            model_version: u32::try_from(row.model_version)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?,
            model_kind: ModelKind::parse(&row.model_kind)
                .ok_or_else(|| corrupt("model kind", &row.model_kind))?,
            created_at: to_datetime(row.created_at)?,
        })
    }
}

/// SQLite-backed repository for observations, features, models and forecasts
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Connect to the configured database, creating it if needed, and migrate
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        info!("Opening database {}", config.database_url);
        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
        let filename = options.clone().get_filename();
        if let Some(dir) = filename.parent() {
            std::fs::create_dir_all(dir).map_err(sqlx::Error::Io)?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory() -> Result<Self, StorageError> {
        // each connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Create tables that do not exist yet
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema up to date");
        Ok(())
    }

    /// Append pollution records; timestamps already stored are left untouched.
    ///
    /// Returns the number of new rows.
    pub async fn insert_pollution(&self, records: &[PollutionRecord]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for r in records {
            inserted += sqlx::query(
                "INSERT OR IGNORE INTO historical_pollutants \
                 (timestamp, location, latitude, longitude, pm2_5, pm10, no2, so2, co, o3, nh3, aqi) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.timestamp.timestamp())
            .bind(&r.location.name)
            .bind(r.location.latitude)
            .bind(r.location.longitude)
            .bind(r.pm2_5)
            .bind(r.pm10)
            .bind(r.no2)
            .bind(r.so2)
            .bind(r.co)
            .bind(r.o3)
            .bind(r.nh3)
            .bind(r.aqi.map(i64::from))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        debug!("Inserted {} of {} pollution records", inserted, records.len());
        Ok(inserted)
    }

    /// Append weather records; timestamps already stored are left untouched
    pub async fn insert_weather(&self, records: &[WeatherRecord]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for r in records {
            inserted += sqlx::query(
                "INSERT OR IGNORE INTO weather_observations \
                 (timestamp, location, latitude, longitude, temperature, humidity, pressure, \
                  windspeed, winddirection, precipitation) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.timestamp.timestamp())
            .bind(&r.location.name)
            .bind(r.location.latitude)
            .bind(r.location.longitude)
            .bind(r.temperature)
            .bind(r.humidity)
            .bind(r.pressure)
            .bind(r.windspeed)
            .bind(r.winddirection)
            .bind(r.precipitation)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        debug!("Inserted {} of {} weather records", inserted, records.len());
        Ok(inserted)
    }

    /// Append feature rows.
    ///
    /// A stored row is only replaced when it had no label and the new row
    /// has one, so rows near the end of a fetch window gain their label on
    /// a later run. Returns the number of rows inserted or labelled.
    pub async fn insert_feature_rows(&self, rows: &[FeatureRow]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(
                "INSERT INTO training_features (timestamp, label, data) VALUES (?, ?, ?) \
                 ON CONFLICT (timestamp) DO UPDATE SET label = excluded.label, data = excluded.data \
                 WHERE training_features.label IS NULL AND excluded.label IS NOT NULL",
            )
            .bind(row.timestamp.timestamp())
            .bind(row.label)
            .bind(serde_json::to_string(row)?)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        debug!("Inserted {} of {} feature rows", inserted, rows.len());
        Ok(inserted)
    }

    /// Pollution records with `start <= timestamp <= end`, oldest first
    pub async fn pollution_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PollutionRecord>, StorageError> {
        let rows: Vec<PollutionRow> = sqlx::query_as(
            "SELECT timestamp, location, latitude, longitude, pm2_5, pm10, no2, so2, co, o3, nh3, aqi \
             FROM historical_pollutants WHERE timestamp BETWEEN ? AND ? ORDER BY timestamp",
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PollutionRecord::try_from).collect()
    }

    /// Weather records with `start <= timestamp <= end`, oldest first
    pub async fn weather_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherRecord>, StorageError> {
        let rows: Vec<WeatherRow> = sqlx::query_as(
            "SELECT timestamp, location, latitude, longitude, temperature, humidity, pressure, \
             windspeed, winddirection, precipitation \
             FROM weather_observations WHERE timestamp BETWEEN ? AND ? ORDER BY timestamp",
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WeatherRecord::try_from).collect()
    }

    /// Most recent stored pollution timestamp
    pub async fn latest_pollution_timestamp(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM historical_pollutants")
            .fetch_one(&self.pool)
            .await?;
        latest.map(to_datetime).transpose()
    }

    /// Every stored feature row, oldest first
    pub async fn feature_rows(&self) -> Result<Vec<FeatureRow>, StorageError> {
        let rows: Vec<FeatureRowRecord> =
            sqlx::query_as("SELECT data FROM training_features ORDER BY timestamp")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|r| serde_json::from_str(&r.data).map_err(StorageError::from))
            .collect()
    }

    /// Store a training run under the next model version.
    ///
    /// The assigned version is written back into `artifacts` and returned.
    pub async fn insert_model_run(&self, artifacts: &mut [ModelArtifact]) -> Result<u32, StorageError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM model_registry")
            .fetch_one(&mut *tx)
            .await?;
        let version = u32::try_from(current.unwrap_or(0) + 1)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        for artifact in artifacts.iter_mut() {
            artifact.version = version;
            sqlx::query(
                "INSERT INTO model_registry \
                 (run_id, version, rank, kind, target, horizon_hours, features, params, \
                  rmse, mae, r2, cv_r2, trained_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(artifact.run_id.to_string())
            .bind(i64::from(artifact.version))
            .bind(i64::from(artifact.rank))
            .bind(artifact.kind.as_str())
            .bind(artifact.target.as_str())
            .bind(i64::from(artifact.horizon_hours))
            .bind(serde_json::to_string(&artifact.features)?)
            .bind(&artifact.params)
            .bind(artifact.rmse)
            .bind(artifact.mae)
            .bind(artifact.r2)
            .bind(artifact.cv_r2)
            .bind(artifact.trained_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Registered {} models as version {}", artifacts.len(), version);
        Ok(version)
    }

    /// Rank-1 artifact of the latest version
    pub async fn best_model(&self) -> Result<Option<ModelArtifact>, StorageError> {
        let row: Option<ModelRow> = sqlx::query_as(
            "SELECT run_id, version, rank, kind, target, horizon_hours, features, params, \
             rmse, mae, r2, cv_r2, trained_at FROM model_registry \
             WHERE version = (SELECT MAX(version) FROM model_registry) \
             ORDER BY rank LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(ModelArtifact::try_from).transpose()
    }

    /// Every artifact registered under `version`, by rank
    pub async fn model_run(&self, version: u32) -> Result<Vec<ModelArtifact>, StorageError> {
        let rows: Vec<ModelRow> = sqlx::query_as(
            "SELECT run_id, version, rank, kind, target, horizon_hours, features, params, \
             rmse, mae, r2, cv_r2, trained_at FROM model_registry \
             WHERE version = ? ORDER BY rank",
        )
        .bind(i64::from(version))
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        rows.into_iter().map(ModelArtifact::try_from).collect()
    }

    /// Append forecasts
    pub async fn insert_forecasts(&self, forecasts: &[Forecast]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for f in forecasts {
            inserted += sqlx::query(
                "INSERT INTO predictions \
                 (timestamp, target, predicted_value, predicted_aqi, category, model_version, \
                  model_kind, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(f.timestamp.timestamp())
            .bind(f.target.as_str())
            .bind(f.predicted_value)
            .bind(i64::from(f.predicted_aqi))
            .bind(f.category.as_str())
            .bind(i64::from(f.model_version))
            .bind(f.model_kind.as_str())
            .bind(f.created_at.timestamp())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        debug!("Stored {} forecasts", inserted);
        Ok(inserted)
    }

    /// Forecasts for hours in `start..=end`, by hour then creation time
    pub async fn forecasts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, StorageError> {
        let rows: Vec<ForecastRow> = sqlx::query_as(
            "SELECT timestamp, target, predicted_value, predicted_aqi, category, model_version, \
             model_kind, created_at FROM predictions \
             WHERE timestamp BETWEEN ? AND ? ORDER BY timestamp, created_at, id",
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Forecast::try_from).collect()
    }

    /// Replace the current-weather snapshot
    pub async fn replace_current_weather(&self, current: &CurrentWeather) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM current_weather")
            .execute(&mut *tx)
            .await?;
        let w = &current.weather;
        sqlx::query(
            "INSERT INTO current_weather \
             (timestamp, location, latitude, longitude, temperature, humidity, pressure, \
              windspeed, winddirection, precipitation, fetched_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(current.timestamp.timestamp())
        .bind(&current.location.name)
        .bind(current.location.latitude)
        .bind(current.location.longitude)
        .bind(w.temperature)
        .bind(w.humidity)
        .bind(w.pressure)
        .bind(w.windspeed)
        .bind(w.winddirection)
        .bind(w.precipitation)
        .bind(current.fetched_at.timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Current-weather snapshot, if a prediction run has stored one
    pub async fn current_weather(&self) -> Result<Option<CurrentWeather>, StorageError> {
        let row: Option<CurrentWeatherRow> = sqlx::query_as(
            "SELECT timestamp, location, latitude, longitude, temperature, humidity, pressure, \
             windspeed, winddirection, precipitation, fetched_at FROM current_weather LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<CurrentWeather, StorageError> {
            Ok(CurrentWeather {
                timestamp: to_datetime(r.timestamp)?,
                location: location(r.location, r.latitude, r.longitude),
                weather: WeatherConditions {
                    temperature: r.temperature,
                    humidity: r.humidity,
                    pressure: r.pressure,
                    windspeed: r.windspeed,
                    winddirection: r.winddirection,
                    precipitation: r.precipitation,
                },
                fetched_at: to_datetime(r.fetched_at)?,
            })
        })
        .transpose()
    }
}
