//! Gradient boosting with squared loss

use super::tree::{RegressionTree, TreeParams};
use super::{check_shape, Regressor};
use crate::error::TrainError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Stage-wise additive trees fitted to residuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            init: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
        check_shape(x, y)?;
        if !(self.params.learning_rate > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.params.learning_rate
            )));
        }

        let n = x.nrows();
        let rows: Vec<usize> = (0..n).collect();
        let features: Vec<usize> = (0..x.ncols()).collect();
        let h = vec![1.0; n];
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            lambda: 0.0,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        self.init = y.sum() / n as f64;
        let mut predictions = vec![self.init; n];
        self.trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(a, p)| a - p).collect();
            let tree = RegressionTree::fit(x, &residuals, &h, &rows, &features, tree_params, &mut rng);
            for (i, p) in predictions.iter_mut().enumerate() {
                *p += self.params.learning_rate * tree.predict_row(x.row(i));
            }
            self.trees.push(tree);
        }

        debug!("Gradient boosting fitted with {} stages", self.trees.len());
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.init
            + self.params.learning_rate
                * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::rmse;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_more_stages_reduce_training_error() {
        let x = Array2::from_shape_fn((80, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..80).map(|i| ((i as f64) / 8.0).sin() * 10.0));

        let score = |n_estimators| {
            let mut model = GradientBoosting::new(BoostingParams {
                n_estimators,
                learning_rate: 0.1,
                ..Default::default()
            });
            model.fit(x.view(), y.view()).unwrap();
            rmse(y.as_slice().unwrap(), model.predict(x.view()).as_slice().unwrap())
        };

        assert!(score(50) < score(5));
    }

    #[test]
    fn test_rejects_bad_learning_rate() {
        let x = Array2::zeros((4, 1));
        let y = Array1::zeros(4);
        let mut model = GradientBoosting::new(BoostingParams {
            learning_rate: 0.0,
            ..Default::default()
        });
        assert!(matches!(
            model.fit(x.view(), y.view()),
            Err(TrainError::InvalidConfig(_))
        ));
    }
}
