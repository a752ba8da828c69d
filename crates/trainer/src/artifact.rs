//! Trained model artifact

use crate::error::TrainError;
use crate::models::{ModelKind, TrainedModel};
use chrono::{DateTime, Duration, Utc};
use feature_engine::Target;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ranked model from one training run, with its validation scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub run_id: Uuid,
    /// Assigned when the run is persisted; increases with every run
    pub version: u32,
    /// 1 = best candidate of the run
    pub rank: u32,
    pub kind: ModelKind,
    pub target: Target,
    pub horizon_hours: u32,
    /// Ordered feature names the model was fitted on
    pub features: Vec<String>,
    /// Postcard-encoded [`TrainedModel`]
    pub params: Vec<u8>,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean R² over the training-split folds, when cross-validation ran
    pub cv_r2: Option<f64>,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Decode the fitted model
    pub fn model(&self) -> Result<TrainedModel, TrainError> {
        let model = TrainedModel::from_bytes(&self.params)?;
        if model.kind() != self.kind {
            return Err(TrainError::Encoding(format!(
                "artifact tagged {} holds {} parameters",
                self.kind,
                model.kind()
            )));
        }
        Ok(model)
    }

    /// Time elapsed since training
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.trained_at
    }
}
