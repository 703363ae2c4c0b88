//! Category Trend Analyzer
//!
//! Buckets spending by ISO week and category, fits a linear trend over the
//! weekly totals per category, and reports variability alongside direction.

use chrono::Datelike;
use std::collections::BTreeMap;
use tracing::debug;

use crate::features::FeatureTable;
use crate::models::{CategoryTrend, TrendDirection, TrendReport};
use crate::stats;

/// Categories need this many weekly buckets before a trend line means much.
const MIN_WEEKLY_BUCKETS: usize = 3;

/// Slopes within this fraction of the weekly mean count as stable.
const STABLE_SLOPE_FRACTION: f64 = 0.05;

pub fn analyze_trends(table: &FeatureTable) -> TrendReport {
    // category -> iso (year, week) -> total
    let mut weekly: BTreeMap<String, BTreeMap<(i32, u32), f64>> = BTreeMap::new();
    for row in &table.rows {
        let iso = row.date().iso_week();
        *weekly
            .entry(row.category.clone())
            .or_default()
            .entry((iso.year(), iso.week()))
            .or_default() += row.amount_abs;
    }

    let mut trends = Vec::new();
    for (category, buckets) in weekly {
        if buckets.len() < MIN_WEEKLY_BUCKETS {
            continue;
        }
        // BTreeMap iterates weeks in chronological order.
        let totals: Vec<f64> = buckets.values().copied().collect();
        let (slope, _) = stats::linear_fit(&totals);
        let weekly_average = stats::mean(&totals);
        let total_amount: f64 = totals.iter().sum();

        let direction = if slope.abs() <= STABLE_SLOPE_FRACTION * weekly_average {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        let variability = if weekly_average > 0.0 {
            stats::stdev(&totals) / weekly_average
        } else {
            0.0
        };

        trends.push(CategoryTrend {
            category,
            slope,
            direction,
            variability,
            weekly_average,
            total_amount,
        });
    }

    trends.sort_by(|a, b| {
        b.total_amount
            .partial_cmp(&a.total_amount)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let most_variable = trends
        .iter()
        .max_by(|a, b| {
            a.variability
                .partial_cmp(&b.variability)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|t| t.category.clone());

    debug!(categories = trends.len(), "Trend analysis complete");

    TrendReport {
        trends,
        most_variable,
    }
}
