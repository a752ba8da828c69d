//! Second-order boosting with row and column subsampling

use super::tree::{RegressionTree, TreeParams};
use super::{check_shape, Regressor};
use crate::error::TrainError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XgBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows drawn without replacement per tree
    pub subsample: f64,
    /// Fraction of features drawn per tree
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum per leaf; rows per leaf under squared loss
    pub min_child_weight: usize,
    pub seed: u64,
}

impl Default for XgBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.8,
            colsample_bytree: 0.8,
            lambda: 1.0,
            min_child_weight: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgBoost {
    params: XgBoostParams,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl XgBoost {
    pub fn new(params: XgBoostParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn draw(rng: &mut StdRng, len: usize, fraction: f64) -> Vec<usize> {
        let amount = ((len as f64) * fraction).round() as usize;
        let amount = amount.clamp(1, len);
        let mut picked = sample(rng, len, amount).into_vec();
        picked.sort_unstable();
        picked
    }
}

impl Regressor for XgBoost {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
        check_shape(x, y)?;
        let p = &self.params;
        for (name, value) in [("subsample", p.subsample), ("colsample_bytree", p.colsample_bytree)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(TrainError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(p.learning_rate > 0.0) || p.lambda < 0.0 {
            return Err(TrainError::InvalidConfig(
                "learning_rate must be positive and lambda non-negative".to_string(),
            ));
        }

        let n = x.nrows();
        let h = vec![1.0; n];
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_split: 2 * p.min_child_weight.max(1),
            min_samples_leaf: p.min_child_weight.max(1),
            lambda: p.lambda,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(p.seed);

        self.base_score = y.sum() / n as f64;
        let mut predictions = vec![self.base_score; n];
        let mut trees = Vec::with_capacity(p.n_estimators);

        for _ in 0..p.n_estimators {
            // negative gradient of squared loss
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(a, f)| a - f).collect();
            let rows = Self::draw(&mut rng, n, p.subsample);
            let features = Self::draw(&mut rng, x.ncols(), p.colsample_bytree);

            let tree = RegressionTree::fit(x, &residuals, &h, &rows, &features, tree_params, &mut rng);
            for (i, pred) in predictions.iter_mut().enumerate() {
                *pred += p.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        self.trees = trees;
        debug!("XGBoost-style model fitted with {} rounds", self.trees.len());
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_score
            + self.params.learning_rate
                * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
