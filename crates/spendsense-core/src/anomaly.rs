//! Anomaly Detector
//!
//! Unsupervised outlier scoring over engineered features. The model is
//! injected (see `ml`), fitted per batch on standardized columns, and
//! points strictly below the fitted score threshold are flagged. A
//! degenerate fit degrades to an empty report instead of failing the run.

use tracing::{debug, warn};

use crate::engine::AnalysisConfig;
use crate::features::{FeatureRow, FeatureTable};
use crate::ml::OutlierModel;
use crate::models::{Anomaly, AnomalyReport};
use crate::stats;

/// Feature vector fed to the outlier model.
fn feature_vector(row: &FeatureRow) -> Vec<f64> {
    vec![
        row.amount_abs,
        row.hour as f64,
        row.day_of_week as f64,
        row.category_encoded as f64,
    ]
}

/// Standardize columns to zero mean, unit variance. Zero-variance columns
/// are left centered so they can't dominate or divide by zero.
fn standardize(matrix: &mut [Vec<f64>]) {
    if matrix.is_empty() {
        return;
    }
    let width = matrix[0].len();
    for col in 0..width {
        let values: Vec<f64> = matrix.iter().map(|r| r[col]).collect();
        let m = stats::mean(&values);
        let s = stats::stdev(&values);
        for row in matrix.iter_mut() {
            row[col] -= m;
            if s > 0.0 {
                row[col] /= s;
            }
        }
    }
}

/// Human-auditable reason a transaction looks unusual.
fn explain(row: &FeatureRow, batch_mean: f64, table: &FeatureTable) -> String {
    let mut reasons = Vec::new();

    if batch_mean > 0.0 && row.amount_abs > 3.0 * batch_mean {
        reasons.push(format!(
            "amount ${:.2} is over 3x your average of ${:.2}",
            row.amount_abs, batch_mean
        ));
    }
    if row.is_late_night {
        reasons.push(format!("charged late at night ({:02}:00)", row.hour));
    }
    let cat_mean = table.category_mean(&row.category);
    if cat_mean > 0.0 && row.amount_abs > 2.0 * cat_mean {
        reasons.push(format!(
            "amount ${:.2} is over 2x the {} average of ${:.2}",
            row.amount_abs, row.category, cat_mean
        ));
    }

    if reasons.is_empty() {
        "unusual combination of amount, time, and category".to_string()
    } else {
        reasons.join("; ")
    }
}

pub fn detect_anomalies(
    table: &FeatureTable,
    model: &dyn OutlierModel,
    config: &AnalysisConfig,
) -> AnomalyReport {
    if table.len() < config.min_anomaly_rows {
        debug!(
            rows = table.len(),
            required = config.min_anomaly_rows,
            "Too few rows for anomaly detection"
        );
        return AnomalyReport::default();
    }

    let mut matrix: Vec<Vec<f64>> = table.rows.iter().map(feature_vector).collect();
    standardize(&mut matrix);

    let fitted = match model.fit(&matrix) {
        Ok(f) => f,
        Err(e) => {
            // Degenerate input (e.g. zero variance everywhere) degrades to
            // an empty report, not a failed run.
            warn!(error = %e, "Outlier model fit failed");
            return AnomalyReport::default();
        }
    };

    let threshold = fitted.threshold();
    let batch_mean = table.mean_amount();

    let mut anomalies: Vec<Anomaly> = table
        .rows
        .iter()
        .zip(matrix.iter())
        .filter_map(|(row, features)| {
            let score = fitted.score(features);
            if score < threshold {
                Some(Anomaly {
                    transaction_id: row.transaction_id.clone(),
                    score,
                    is_anomaly: true,
                    explanation: explain(row, batch_mean, table),
                })
            } else {
                None
            }
        })
        .collect();

    // Most anomalous (lowest score) first.
    anomalies.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    debug!(
        flagged = anomalies.len(),
        evaluated = table.len(),
        threshold,
        "Anomaly detection complete"
    );

    AnomalyReport {
        anomalies,
        threshold,
        evaluated: table.len(),
    }
}
