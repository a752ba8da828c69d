//! Model Trainer
//!
//! Fits candidate regressors on time-ordered feature rows, scores them on a
//! trailing validation split and returns the best as ranked artifacts.

mod artifact;
mod dataset;
mod error;
mod metrics;
pub mod models;
mod trainer;
mod validation;

pub use artifact::ModelArtifact;
pub use dataset::Dataset;
pub use error::TrainError;
pub use metrics::{mae, mse, r2, rmse};
pub use models::{ModelKind, Regressor, TrainedModel};
pub use trainer::{CandidateScore, Trainer, TrainingConfig};
pub use validation::{contiguous_folds, train_test_split};
