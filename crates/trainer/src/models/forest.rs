//! Bootstrap-aggregated regression forest

use super::tree::{RegressionTree, TreeParams};
use super::{check_shape, Regressor};
use crate::error::TrainError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features drawn per split
    pub max_features: f64,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 15,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
        check_shape(x, y)?;
        if self.params.n_estimators == 0 {
            return Err(TrainError::InvalidConfig(
                "forest needs at least one estimator".to_string(),
            ));
        }

        let n = x.nrows();
        let g = y.to_vec();
        let h = vec![1.0; n];
        let features: Vec<usize> = (0..x.ncols()).collect();
        let per_split = ((x.ncols() as f64) * self.params.max_features).ceil() as usize;
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            lambda: 0.0,
            max_features: Some(per_split.clamp(1, x.ncols().max(1))),
        };

        self.trees = (0..self.params.n_estimators)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = if self.params.bootstrap {
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, &g, &h, &rows, &features, tree_params, &mut rng)
            })
            .collect();

        debug!("Random forest fitted with {} trees", self.trees.len());
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
