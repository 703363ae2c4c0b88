//! Isolation forest outlier model
//!
//! Ensemble of randomized axis-parallel partition trees. Points that
//! isolate in few splits are outliers. The fitted threshold is the
//! contamination quantile of the training scores, so roughly that share of
//! a varied batch lands outside the boundary; a degenerate batch where
//! every point scores identically flags nothing (the comparison is strict).

use tracing::debug;

use super::rng::ModelRng;
use super::{FittedOutlier, OutlierModel};
use crate::error::{Error, Result};
use crate::stats;

/// Average unsuccessful-search path length in a BST of n nodes. Standard
/// normalizer for isolation depth.
fn avg_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    const EULER: f64 = 0.577_215_664_901_532_9;
    2.0 * ((n - 1.0).ln() + EULER) - 2.0 * (n - 1.0) / n
}

enum Node {
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn path_length(&self, row: &[f64], depth: f64) -> f64 {
        match self {
            Node::Leaf { size } => depth + avg_path_length(*size),
            Node::Split {
                feature,
                value,
                left,
                right,
            } => {
                if row.get(*feature).copied().unwrap_or(0.0) < *value {
                    left.path_length(row, depth + 1.0)
                } else {
                    right.path_length(row, depth + 1.0)
                }
            }
        }
    }
}

fn build_tree(
    rows: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut ModelRng,
) -> Node {
    if indices.len() <= 1 || depth >= max_depth {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Candidate features are those with any spread in this partition.
    let width = rows[indices[0]].len();
    let mut candidates = Vec::new();
    for f in 0..width {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &i in indices {
            let v = rows[i][f];
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if hi > lo {
            candidates.push((f, lo, hi));
        }
    }
    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = candidates[rng.next_below(candidates.len())];
    let value = rng.next_in_range(lo, hi);

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| rows[i][feature] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(build_tree(rows, &left_idx, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(rows, &right_idx, depth + 1, max_depth, rng)),
    }
}

/// Isolation forest configuration. `fit` produces a reusable fitted value.
pub struct IsolationForest {
    pub trees: usize,
    pub sample_size: usize,
    /// Expected share of outliers in a batch, sets the score threshold
    pub contamination: f64,
    pub seed: u64,
}

impl IsolationForest {
    pub fn new(seed: u64) -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            contamination: 0.1,
            seed,
        }
    }
}

pub struct FittedIsolationForest {
    trees: Vec<Node>,
    normalizer: f64,
    threshold: f64,
}

impl FittedIsolationForest {
    /// Anomaly measure in (0, 1]; higher isolates faster.
    fn measure(&self, row: &[f64]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(row, 0.0))
            .sum();
        let avg = total / self.trees.len() as f64;
        2f64.powf(-avg / self.normalizer)
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&self, rows: &[Vec<f64>]) -> Result<Box<dyn FittedOutlier>> {
        if rows.is_empty() {
            return Err(Error::ModelFit("empty training batch".into()));
        }
        let width = rows[0].len();
        if width == 0 || rows.iter().any(|r| r.len() != width) {
            return Err(Error::ModelFit("inconsistent feature width".into()));
        }

        let sample = self.sample_size.min(rows.len());
        let max_depth = (sample as f64).log2().ceil().max(1.0) as usize;
        let mut rng = ModelRng::new(self.seed, 1);

        let mut trees = Vec::with_capacity(self.trees);
        for _ in 0..self.trees {
            let indices: Vec<usize> = if sample == rows.len() {
                (0..rows.len()).collect()
            } else {
                (0..sample).map(|_| rng.next_below(rows.len())).collect()
            };
            trees.push(build_tree(rows, &indices, 0, max_depth, &mut rng));
        }

        let mut fitted = FittedIsolationForest {
            trees,
            normalizer: avg_path_length(sample).max(1e-9),
            threshold: 0.0,
        };

        // Threshold at the contamination quantile of the training scores.
        let scores: Vec<f64> = rows.iter().map(|r| fitted.score(r)).collect();
        fitted.threshold = stats::percentile(&scores, self.contamination * 100.0);

        debug!(
            trees = self.trees,
            sample,
            threshold = fitted.threshold,
            "Isolation forest fitted"
        );

        Ok(Box::new(fitted))
    }
}

impl FittedOutlier for FittedIsolationForest {
    fn score(&self, row: &[f64]) -> f64 {
        // Decision-function convention: 0.5 - measure, so anomalies go
        // negative and normal points sit near +0.5.
        0.5 - self.measure(row)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_scores_below_cluster() {
        // Tight cluster plus one far point.
        let mut rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![10.0 + (i % 5) as f64 * 0.1, 1.0])
            .collect();
        rows.push(vec![500.0, 1.0]);

        let model = IsolationForest::new(42);
        let fitted = model.fit(&rows).unwrap();

        let outlier_score = fitted.score(&rows[50]);
        let normal_score = fitted.score(&rows[0]);
        assert!(outlier_score < normal_score);
        assert!(outlier_score < fitted.threshold());
    }

    #[test]
    fn test_degenerate_batch_flags_nothing() {
        let rows: Vec<Vec<f64>> = (0..30).map(|_| vec![12.0, 3.0]).collect();
        let model = IsolationForest::new(42);
        let fitted = model.fit(&rows).unwrap();

        // Every point scores identically, so nothing is strictly below.
        let flagged = rows
            .iter()
            .filter(|r| fitted.score(r) < fitted.threshold())
            .count();
        assert_eq!(flagged, 0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 7) as f64, (i % 3) as f64])
            .collect();
        let a = IsolationForest::new(9).fit(&rows).unwrap();
        let b = IsolationForest::new(9).fit(&rows).unwrap();
        for r in &rows {
            assert_eq!(a.score(r).to_bits(), b.score(r).to_bits());
        }
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let model = IsolationForest::new(1);
        assert!(model.fit(&[]).is_err());
        assert!(model.fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
