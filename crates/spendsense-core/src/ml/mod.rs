//! Model strategies
//!
//! The outlier model and the regressor are injected into the engine as
//! explicit dependencies rather than discovered at runtime, so behavior is
//! deterministic and swappable in tests. Fitting and prediction are distinct
//! steps: `fit` consumes a batch and returns a fitted value that can be kept
//! around and queried without refitting.
//!
//! RULE: nothing in this module may call a platform RNG. All randomness
//! flows through a `ModelRng` derived from the explicit seed on
//! `AnalysisConfig`.

pub mod forest_regressor;
pub mod isolation_forest;
pub mod rng;

pub use forest_regressor::ForestRegressor;
pub use isolation_forest::IsolationForest;
pub use rng::ModelRng;

use crate::error::Result;

/// Unsupervised outlier model strategy.
pub trait OutlierModel: Send + Sync {
    /// Fit on a batch of feature vectors (rows must share one width).
    fn fit(&self, rows: &[Vec<f64>]) -> Result<Box<dyn FittedOutlier>>;
}

/// A fitted outlier model.
///
/// Sign convention (fixed for the whole crate): `score` follows the
/// decision-function style — higher means more normal, and points scoring
/// strictly below `threshold()` are outside the learned boundary. Ranking
/// for output ascends from the most negative score.
pub trait FittedOutlier: Send + Sync {
    fn score(&self, row: &[f64]) -> f64;

    /// Contamination-quantile score boundary fitted on the training batch.
    fn threshold(&self) -> f64;
}

/// Supervised regression model strategy.
pub trait Regressor: Send + Sync {
    /// Fit on feature rows against targets. `x` and `y` must be equal length.
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Box<dyn FittedRegressor>>;
}

/// A fitted regressor, queryable without refitting.
pub trait FittedRegressor: Send + Sync {
    fn predict(&self, row: &[f64]) -> f64;
}
