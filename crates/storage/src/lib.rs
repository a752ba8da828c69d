//! Storage Layer
//!
//! SQLite persistence for observations, feature rows, the model registry,
//! forecasts and the current-weather snapshot.

mod repository;
mod schema;

pub use repository::{CurrentWeather, Repository, StorageConfig};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}
