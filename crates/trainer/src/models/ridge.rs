//! Ridge regression on standardized features

use super::Regressor;
use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Linear model with an L2 penalty; features are standardized before fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ridge {
    alpha: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
    fitted: bool,
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            means: Vec::new(),
            scales: Vec::new(),
            coefficients: Vec::new(),
            intercept: 0.0,
            fitted: false,
        }
    }

    /// Coefficients in standardized feature space
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for Ridge {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), TrainError> {
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(TrainError::Shape(format!(
                "{} rows against {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if !(self.alpha > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "ridge alpha must be positive, got {}",
                self.alpha
            )));
        }

        let n = x.nrows() as f64;
        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let z = (&x - &means) / &scales;

        let y_mean = y.sum() / n;
        let yc = y.mapv(|v| v - y_mean);

        let mut gram: Array2<f64> = z.t().dot(&z);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.alpha;
        }
        let rhs = z.t().dot(&yc);

        self.coefficients = solve(gram, rhs)?.to_vec();
        self.means = means.to_vec();
        self.scales = scales.to_vec();
        self.intercept = y_mean;
        self.fitted = true;
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.means)
                .zip(&self.scales)
                .zip(&self.coefficients)
                .map(|(((v, m), s), w)| (v - m) / s * w)
                .sum::<f64>()
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

/// Solve `a · w = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, TrainError> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|i, j| a[[*i, col]].abs().total_cmp(&a[[*j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(TrainError::Shape("singular normal equations".to_string()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * w[k]).sum();
        w[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(w)
}
