//! Spending Predictor
//!
//! Aggregates the feature table into daily totals, trains the injected
//! regressor on a chronological 80/20 split, and projects the next 30
//! calendar days with a holdout-derived confidence band.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::engine::AnalysisConfig;
use crate::features::FeatureTable;
use crate::ml::Regressor;
use crate::models::{ConfidenceLabel, DailyPrediction, ForecastReport};
use crate::stats;

/// Daily regression features: [day_of_week, month, is_weekend, tx_count].
fn day_features(date: NaiveDate, tx_count: f64) -> Vec<f64> {
    let dow = date.weekday().num_days_from_monday();
    vec![
        dow as f64,
        date.month() as f64,
        if dow >= 5 { 1.0 } else { 0.0 },
        tx_count,
    ]
}

pub fn forecast_spending(
    table: &FeatureTable,
    regressor: &dyn Regressor,
    config: &AnalysisConfig,
) -> ForecastReport {
    // Daily buckets: (sum of amount_abs, transaction count). BTreeMap keeps
    // them in date order for the chronological split.
    let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for row in &table.rows {
        let entry = daily.entry(row.date()).or_insert((0.0, 0));
        entry.0 += row.amount_abs;
        entry.1 += 1;
    }

    if daily.len() < config.min_forecast_days {
        debug!(
            days = daily.len(),
            required = config.min_forecast_days,
            "Too few daily buckets to forecast"
        );
        return ForecastReport::default();
    }

    let days: Vec<(NaiveDate, f64, usize)> =
        daily.iter().map(|(d, (t, c))| (*d, *t, *c)).collect();

    let x: Vec<Vec<f64>> = days
        .iter()
        .map(|(d, _, c)| day_features(*d, *c as f64))
        .collect();
    let y: Vec<f64> = days.iter().map(|(_, t, _)| *t).collect();

    // Chronological 80/20 holdout.
    let split = ((days.len() as f64) * 0.8).floor() as usize;
    let split = split.clamp(1, days.len() - 1);

    let fitted = match regressor.fit(&x[..split], &y[..split]) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "Regressor fit failed, skipping forecast");
            return ForecastReport::default();
        }
    };

    // Holdout evaluation: accuracy and residual spread for the band.
    let holdout_x = &x[split..];
    let holdout_y = &y[split..];
    let residuals: Vec<f64> = holdout_x
        .iter()
        .zip(holdout_y)
        .map(|(features, actual)| actual - fitted.predict(features))
        .collect();
    let mae = stats::mean(&residuals.iter().map(|r| r.abs()).collect::<Vec<_>>());
    let actual_mean = stats::mean(holdout_y);
    let accuracy = if actual_mean > 0.0 {
        (1.0 - mae / actual_mean).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let band = 1.96 * stats::stdev(&residuals);

    // Project the next 30 calendar days with real calendar features and
    // the window's average daily transaction count.
    let avg_count = stats::mean(&days.iter().map(|(_, _, c)| *c as f64).collect::<Vec<_>>());
    let last_day = days.last().map(|(d, _, _)| *d).unwrap_or(NaiveDate::MIN);

    let predictions: Vec<DailyPrediction> = (1..=30)
        .map(|offset| {
            let date = last_day + Duration::days(offset);
            let predicted = fitted.predict(&day_features(date, avg_count)).max(0.0);
            DailyPrediction {
                date,
                predicted_amount: predicted,
                confidence_lower: (predicted - band).max(0.0),
                confidence_upper: predicted + band,
            }
        })
        .collect();

    let weekly_total: f64 = predictions.iter().take(7).map(|p| p.predicted_amount).sum();
    let monthly_total: f64 = predictions.iter().map(|p| p.predicted_amount).sum();

    debug!(accuracy, weekly_total, monthly_total, "Forecast complete");

    ForecastReport {
        predictions,
        weekly_total,
        monthly_total,
        accuracy,
        confidence: Some(ConfidenceLabel::from_accuracy(accuracy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{preprocess, Preprocessed};
    use crate::ml::ForestRegressor;
    use crate::models::TransactionRecord;

    fn daily_history(days: usize) -> Vec<TransactionRecord> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut txs = Vec::new();
        for d in 0..days {
            let date = start + Duration::days(d as i64);
            // Weekends spend more, weekdays steady
            let amount = if date.weekday().num_days_from_monday() >= 5 {
                60.0
            } else {
                25.0
            };
            for k in 0..2 {
                txs.push(TransactionRecord {
                    id: format!("d{}k{}", d, k),
                    date: format!("{}T12:00:00", date.format("%Y-%m-%d")),
                    amount: -amount / 2.0,
                    merchant: "Store".to_string(),
                    category: "groceries".to_string(),
                    description: String::new(),
                });
            }
        }
        txs
    }

    fn table_from(txs: Vec<TransactionRecord>) -> FeatureTable {
        match preprocess(&txs, 1) {
            Preprocessed::Table(t) => t,
            _ => panic!("expected table"),
        }
    }

    #[test]
    fn test_under_thirty_days_skips() {
        let table = table_from(daily_history(20));
        let report = forecast_spending(
            &table,
            &ForestRegressor::new(42),
            &AnalysisConfig::default(),
        );
        assert!(report.predictions.is_empty());
        assert!(report.confidence.is_none());
    }

    #[test]
    fn test_thirty_day_projection() {
        let table = table_from(daily_history(60));
        let report = forecast_spending(
            &table,
            &ForestRegressor::new(42),
            &AnalysisConfig::default(),
        );

        assert_eq!(report.predictions.len(), 30);

        // Projection starts the day after the last observed date
        let last_observed = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(report.predictions[0].date, last_observed + Duration::days(1));

        // Band invariants
        for p in &report.predictions {
            assert!(p.confidence_lower >= 0.0);
            assert!(p.confidence_lower <= p.predicted_amount);
            assert!(p.confidence_upper >= p.predicted_amount);
        }
    }

    #[test]
    fn test_weekly_total_is_exact_sum_of_first_seven() {
        let table = table_from(daily_history(45));
        let report = forecast_spending(
            &table,
            &ForestRegressor::new(7),
            &AnalysisConfig::default(),
        );

        let first_seven: f64 = report
            .predictions
            .iter()
            .take(7)
            .map(|p| p.predicted_amount)
            .sum();
        assert_eq!(report.weekly_total, first_seven);

        let all: f64 = report.predictions.iter().map(|p| p.predicted_amount).sum();
        assert_eq!(report.monthly_total, all);
    }

    #[test]
    fn test_learns_weekend_pattern() {
        let table = table_from(daily_history(90));
        let report = forecast_spending(
            &table,
            &ForestRegressor::new(42),
            &AnalysisConfig::default(),
        );

        let weekend_avg = stats::mean(
            &report
                .predictions
                .iter()
                .filter(|p| p.date.weekday().num_days_from_monday() >= 5)
                .map(|p| p.predicted_amount)
                .collect::<Vec<_>>(),
        );
        let weekday_avg = stats::mean(
            &report
                .predictions
                .iter()
                .filter(|p| p.date.weekday().num_days_from_monday() < 5)
                .map(|p| p.predicted_amount)
                .collect::<Vec<_>>(),
        );
        assert!(weekend_avg > weekday_avg);
        assert!(report.accuracy > 0.6);
    }
}
