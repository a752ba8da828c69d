//! Candidate regressors

mod boosting;
mod forest;
mod ridge;
mod tree;
mod xgboost;

pub use boosting::{BoostingParams, GradientBoosting};
pub use forest::{ForestParams, RandomForest};
pub use ridge::Ridge;
pub use tree::{RegressionTree, TreeParams};
pub use xgboost::{XgBoost, XgBoostParams};

use crate::error::TrainError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Common interface for every candidate model
pub trait Regressor {
    /// Fit on a design matrix and aligned labels
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError>;

    /// Predict one feature vector
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64;

    /// Predict every row of `x`
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    fn is_fitted(&self) -> bool;
}

pub(crate) fn check_shape(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
    if x.nrows() != y.len() || x.nrows() == 0 || x.ncols() == 0 {
        return Err(TrainError::Shape(format!(
            "{}x{} design matrix against {} labels",
            x.nrows(),
            x.ncols(),
            y.len()
        )));
    }
    Ok(())
}

/// Candidate model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Ridge,
    GradientBoosting,
    RandomForest,
    #[serde(rename = "xgboost")]
    XgBoost,
}

impl ModelKind {
    /// Relative complexity; lower wins ties on the validation metric
    pub fn complexity(&self) -> u8 {
        match self {
            ModelKind::Ridge => 0,
            ModelKind::GradientBoosting => 1,
            ModelKind::RandomForest => 2,
            ModelKind::XgBoost => 3,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Ridge => "ridge",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::RandomForest => "random_forest",
            ModelKind::XgBoost => "xgboost",
        }
    }

    /// Parse the string representation back
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ridge" => Some(ModelKind::Ridge),
            "gradient_boosting" => Some(ModelKind::GradientBoosting),
            "random_forest" => Some(ModelKind::RandomForest),
            "xgboost" => Some(ModelKind::XgBoost),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted model of any family, serializable as artifact parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    Ridge(Ridge),
    GradientBoosting(GradientBoosting),
    RandomForest(RandomForest),
    XgBoost(XgBoost),
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::Ridge(_) => ModelKind::Ridge,
            TrainedModel::GradientBoosting(_) => ModelKind::GradientBoosting,
            TrainedModel::RandomForest(_) => ModelKind::RandomForest,
            TrainedModel::XgBoost(_) => ModelKind::XgBoost,
        }
    }

    /// Encode parameters with postcard
    pub fn to_bytes(&self) -> Result<Vec<u8>, TrainError> {
        postcard::to_allocvec(self).map_err(|e| TrainError::Encoding(e.to_string()))
    }

    /// Decode parameters written by [`TrainedModel::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrainError> {
        postcard::from_bytes(bytes).map_err(|e| TrainError::Encoding(e.to_string()))
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            TrainedModel::Ridge(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::XgBoost(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedModel::Ridge(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::XgBoost(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
        self.inner_mut().fit(x, y)
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.inner().predict_row(row)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }
}
