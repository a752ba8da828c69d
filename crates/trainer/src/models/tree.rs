//! Regression tree shared by the forest and boosting models.
//!
//! Trees are grown on per-row targets `g` and weights `h`. A leaf predicts
//! `sum(g) / (sum(h) + lambda)` and a split is scored by
//!
//! ```text
//! gain = G_L^2 / (H_L + lambda) + G_R^2 / (H_R + lambda) - G^2 / (H + lambda)
//! ```
//!
//! With `h = 1` and `lambda = 0` this is the usual variance-reduction CART
//! on `g`; with residuals and `lambda > 0` it is the second-order gain used
//! by XGBoost-style boosting.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

const MIN_GAIN: f64 = 1e-12;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values
    pub lambda: f64,
    /// Features drawn per split; `None` considers every candidate feature
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.0,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted regression tree stored as a flat node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct Grower<'x, 'a> {
    x: ArrayView2<'x, f64>,
    g: &'a [f64],
    h: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `x`, considering only `features`
    pub fn fit(
        x: ArrayView2<'_, f64>,
        g: &[f64],
        h: &[f64],
        rows: &[usize],
        features: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut grower = Grower {
            x,
            g,
            h,
            features,
            params,
            nodes: Vec::new(),
        };
        grower.grow(rows.to_vec(), 0, rng);
        Self {
            nodes: grower.nodes,
        }
    }

    /// Predict a single row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return 0.0,
            }
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match nodes.get(index) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

impl Grower<'_, '_> {
    fn leaf_value(&self, rows: &[usize]) -> f64 {
        let (g, h) = self.sums(rows);
        let denom = h + self.params.lambda;
        if denom > 0.0 {
            g / denom
        } else {
            0.0
        }
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.g[r], h + self.h[r]))
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.lambda;
        if denom > 0.0 {
            g * g / denom
        } else {
            0.0
        }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(&rows),
        });

        if depth >= self.params.max_depth || rows.len() < self.params.min_samples_split {
            return index;
        }

        let Some(split) = self.best_split(&rows, rng) else {
            return index;
        };

        let left = self.grow(split.left, depth + 1, rng);
        let right = self.grow(split.right, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k > 0 && k < self.features.len() => sample(rng, self.features.len(), k)
                .into_iter()
                .map(|i| self.features[i])
                .collect(),
            _ => self.features.to_vec(),
        }
    }

    fn best_split(&self, rows: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let (g_total, h_total) = self.sums(rows);
        let parent = self.score(g_total, h_total);
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();

        for feature in self.candidate_features(rng) {
            let column = self.x.column(feature);
            sorted.sort_by(|a, b| column[*a].total_cmp(&column[*b]));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for i in 0..sorted.len().saturating_sub(1) {
                let r = sorted[i];
                g_left += self.g[r];
                h_left += self.h[r];

                let n_left = i + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let (lo, hi) = (column[r], column[sorted[i + 1]]);
                if lo == hi {
                    continue;
                }

                let gain = self.score(g_left, h_left)
                    + self.score(g_total - g_left, h_total - h_left)
                    - parent;
                if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (lo + hi) / 2.0, gain));
                }
            }
        }

        let (feature, threshold, _) = best?;
        let column = self.x.column(feature);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|r| column[**r] <= threshold);
        if left.is_empty() || right.is_empty() {
            return None;
        }

        Some(SplitCandidate {
            feature,
            threshold,
            left,
            right,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::SeedableRng;

    fn fit_on(x: &Array2<f64>, y: &[f64], params: TreeParams) -> RegressionTree {
        let h = vec![1.0; y.len()];
        let rows: Vec<usize> = (0..y.len()).collect();
        let features: Vec<usize> = (0..x.ncols()).collect();
        let mut rng = StdRng::seed_from_u64(42);
        RegressionTree::fit(x.view(), y, &h, &rows, &features, params, &mut rng)
    }

    #[test]
    fn test_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let tree = fit_on(&x, &y, TreeParams::default());

        assert_eq!(tree.predict_row(array![2.5].view()), 5.0);
        assert_eq!(tree.predict_row(array![11.5].view()), 20.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();
        let tree = fit_on(
            &x,
            &y,
            TreeParams {
                max_depth: 2,
                ..Default::default()
            },
        );
        assert!(tree.depth() <= 2);
        assert!(tree.node_count() <= 7);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let tree = fit_on(&x, &[4.0, 4.0, 4.0], TreeParams::default());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict_row(array![100.0].view()), 4.0);
    }

    #[test]
    fn test_lambda_shrinks_leaves() {
        let x = array![[1.0], [2.0]];
        let tree = fit_on(
            &x,
            &[10.0, 10.0],
            TreeParams {
                lambda: 2.0,
                ..Default::default()
            },
        );
        assert_eq!(tree.predict_row(array![1.0].view()), 5.0);
    }

    #[test]
    fn test_fit_on_sliced_view() {
        use ndarray::s;
        let x = array![[0.0, 1.0], [0.0, 2.0], [0.0, 8.0], [0.0, 9.0]];
        let view = x.slice(s![.., 1..]);
        let tree = {
            let g = vec![1.0, 1.0, 6.0, 6.0];
            let h = vec![1.0; 4];
            let mut rng = StdRng::seed_from_u64(7);
            RegressionTree::fit(view, &g, &h, &[0, 1, 2, 3], &[0], TreeParams::default(), &mut rng)
        };
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(array![1.5].view()), 1.0);
        assert_eq!(tree.predict_row(array![8.5].view()), 6.0);
    }
}
