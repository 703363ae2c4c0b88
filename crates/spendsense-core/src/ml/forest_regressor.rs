//! Tree-ensemble regressor
//!
//! Bagged regression trees with greedy variance-reduction splits. Small
//! feature sets keep this cheap; the ensemble is seeded, so a fitted model
//! is reproducible from the config seed.

use tracing::debug;

use super::rng::ModelRng;
use super::{FittedRegressor, Regressor};
use crate::error::{Error, Result};
use crate::stats;

/// Cap on candidate thresholds examined per feature per split.
const MAX_SPLIT_CANDIDATES: usize = 16;

enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { value } => *value,
            Node::Split {
                feature,
                value,
                left,
                right,
            } => {
                if row.get(*feature).copied().unwrap_or(0.0) < *value {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

fn sse(y: &[f64], indices: &[usize]) -> f64 {
    let vals: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
    let m = stats::mean(&vals);
    vals.iter().map(|v| (v - m) * (v - m)).sum()
}

fn build_tree(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    max_depth: usize,
    min_leaf: usize,
) -> Node {
    let leaf_value = || {
        let vals: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        Node::Leaf {
            value: stats::mean(&vals),
        }
    };

    if depth >= max_depth || indices.len() < 2 * min_leaf {
        return leaf_value();
    }

    let parent_sse = sse(y, indices);
    if parent_sse <= 1e-12 {
        return leaf_value();
    }

    let width = x[indices[0]].len();
    let mut best: Option<(f64, usize, f64)> = None; // (sse, feature, threshold)

    for f in 0..width {
        let mut vals: Vec<f64> = indices.iter().map(|&i| x[i][f]).collect();
        vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        vals.dedup();
        if vals.len() < 2 {
            continue;
        }

        // Midpoints between consecutive distinct values, strided down to
        // the candidate cap.
        let stride = (vals.len() / MAX_SPLIT_CANDIDATES).max(1);
        for w in vals.windows(2).step_by(stride) {
            let threshold = (w[0] + w[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[i][f] < threshold);
            if left.len() < min_leaf || right.len() < min_leaf {
                continue;
            }
            let split_sse = sse(y, &left) + sse(y, &right);
            if best.map_or(true, |(b, _, _)| split_sse < b) {
                best = Some((split_sse, f, threshold));
            }
        }
    }

    match best {
        Some((split_sse, feature, value)) if split_sse < parent_sse => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[i][feature] < value);
            Node::Split {
                feature,
                value,
                left: Box::new(build_tree(x, y, &left_idx, depth + 1, max_depth, min_leaf)),
                right: Box::new(build_tree(x, y, &right_idx, depth + 1, max_depth, min_leaf)),
            }
        }
        _ => leaf_value(),
    }
}

/// Forest regressor configuration.
pub struct ForestRegressor {
    pub trees: usize,
    pub max_depth: usize,
    pub min_leaf: usize,
    pub seed: u64,
}

impl ForestRegressor {
    pub fn new(seed: u64) -> Self {
        Self {
            trees: 50,
            max_depth: 6,
            min_leaf: 2,
            seed,
        }
    }
}

pub struct FittedForest {
    trees: Vec<Node>,
}

impl Regressor for ForestRegressor {
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Box<dyn FittedRegressor>> {
        if x.is_empty() || x.len() != y.len() {
            return Err(Error::ModelFit(format!(
                "feature/target length mismatch: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        let width = x[0].len();
        if width == 0 || x.iter().any(|r| r.len() != width) {
            return Err(Error::ModelFit("inconsistent feature width".into()));
        }

        let mut rng = ModelRng::new(self.seed, 2);
        let mut trees = Vec::with_capacity(self.trees);

        for _ in 0..self.trees {
            // Bootstrap sample, same size as the training set.
            let indices: Vec<usize> = (0..x.len()).map(|_| rng.next_below(x.len())).collect();
            trees.push(build_tree(x, y, &indices, 0, self.max_depth, self.min_leaf));
        }

        debug!(trees = self.trees, rows = x.len(), "Forest regressor fitted");
        Ok(Box::new(FittedForest { trees }))
    }
}

impl FittedRegressor for FittedForest {
    fn predict(&self, row: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        total / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_step_function() {
        // y = 10 when x < 5, else 50
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![(i % 10) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] < 5.0 { 10.0 } else { 50.0 }).collect();

        let fitted = ForestRegressor::new(42).fit(&x, &y).unwrap();
        assert!((fitted.predict(&[2.0]) - 10.0).abs() < 5.0);
        assert!((fitted.predict(&[8.0]) - 50.0).abs() < 5.0);
    }

    #[test]
    fn test_constant_target() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y = vec![7.5; 20];
        let fitted = ForestRegressor::new(1).fit(&x, &y).unwrap();
        assert!((fitted.predict(&[3.0]) - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 7) as f64, (i % 4) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * 3.0 + r[1]).collect();

        let a = ForestRegressor::new(5).fit(&x, &y).unwrap();
        let b = ForestRegressor::new(5).fit(&x, &y).unwrap();
        for r in &x {
            assert_eq!(a.predict(r).to_bits(), b.predict(r).to_bits());
        }
    }

    #[test]
    fn test_fit_rejects_mismatched_input() {
        let model = ForestRegressor::new(1);
        assert!(model.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(model.fit(&[], &[]).is_err());
    }
}
