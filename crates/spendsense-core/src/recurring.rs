//! Recurring/Subscription Detector
//!
//! Groups transactions by (merchant hash, amount rounded to cents) and
//! scores how regularly each group repeats. A group needs at least 3
//! occurrences before interval statistics mean anything.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::debug;

use crate::engine::AnalysisConfig;
use crate::features::FeatureTable;
use crate::models::{Frequency, RecurringCharge, RecurringReport};
use crate::stats;

/// Consistency of a series of day-gaps: 1 - stdev/mean, clamped to [0, 1].
/// A zero mean gap (same-day duplicates) scores 0.
pub fn gap_consistency(gaps: &[f64]) -> f64 {
    let mean = stats::mean(gaps);
    if mean <= 0.0 {
        return 0.0;
    }
    (1.0 - stats::stdev(gaps) / mean).clamp(0.0, 1.0)
}

pub fn detect_recurring(table: &FeatureTable, config: &AnalysisConfig) -> RecurringReport {
    // BTreeMap keeps group iteration deterministic across runs.
    let mut groups: BTreeMap<(String, i64), Vec<NaiveDate>> = BTreeMap::new();
    for row in &table.rows {
        let cents = (row.amount_abs * 100.0).round() as i64;
        groups
            .entry((row.merchant_hash.clone(), cents))
            .or_default()
            .push(row.date());
    }

    let mut charges = Vec::new();

    for ((merchant_hash, cents), mut dates) in groups {
        if dates.len() < config.min_recurring_occurrences {
            continue;
        }
        dates.sort();

        let gaps: Vec<f64> = dates
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days() as f64)
            .collect();
        let mean_gap = stats::mean(&gaps);
        let consistency = gap_consistency(&gaps);

        let is_subscription = consistency > config.subscription_consistency
            && (config.monthly_gap_min..=config.monthly_gap_max).contains(&mean_gap);
        let is_recurring = consistency > config.recurring_consistency;

        if !is_subscription && !is_recurring {
            continue;
        }

        let amount = cents as f64 / 100.0;
        let last = *dates.last().unwrap_or(&NaiveDate::MIN);

        charges.push(RecurringCharge {
            merchant_hash,
            amount,
            frequency_days: mean_gap,
            consistency_score: consistency,
            occurrence_count: dates.len(),
            monthly_cost: amount * 30.0 / mean_gap,
            frequency: Frequency::from_mean_gap(mean_gap),
            next_expected_date: last + Duration::days(mean_gap.round() as i64),
            is_subscription,
        });
    }

    // Rank by monthly cost; equal consistency resolves toward the longer
    // occurrence history.
    charges.sort_by(|a, b| {
        b.monthly_cost
            .partial_cmp(&a.monthly_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
    });

    debug!(
        charges = charges.len(),
        subscriptions = charges.iter().filter(|c| c.is_subscription).count(),
        "Recurring detection complete"
    );

    RecurringReport { charges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{preprocess, Preprocessed};
    use crate::models::TransactionRecord;

    fn table_from(txs: Vec<TransactionRecord>) -> FeatureTable {
        match preprocess(&txs, 1) {
            Preprocessed::Table(t) => t,
            _ => panic!("expected table"),
        }
    }

    fn tx(id: &str, date: &str, amount: f64, merchant: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            date: format!("{}T12:00:00", date),
            amount,
            merchant: merchant.to_string(),
            category: "entertainment".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_consistency_boundaries() {
        // Perfectly even intervals score exactly 1.0
        assert_eq!(gap_consistency(&[30.0, 30.0, 30.0]), 1.0);

        // Uneven but real intervals land strictly between 0 and 1
        let c = gap_consistency(&[10.0, 50.0, 30.0]);
        assert!(c > 0.0 && c < 1.0);

        assert_eq!(gap_consistency(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_monthly_subscription_detected() {
        // 6 monthly charges, constant amount, ~30-day spacing
        let dates = [
            "2026-01-05", "2026-02-04", "2026-03-06", "2026-04-05", "2026-05-05", "2026-06-04",
        ];
        let txs: Vec<_> = dates
            .iter()
            .enumerate()
            .map(|(i, d)| tx(&format!("t{}", i), d, -15.99, "Streamflix"))
            .collect();

        let report = detect_recurring(&table_from(txs), &AnalysisConfig::default());
        assert_eq!(report.charges.len(), 1);

        let sub = &report.charges[0];
        assert!(sub.is_subscription);
        assert!(sub.consistency_score > 0.8);
        assert_eq!(sub.frequency, Some(Frequency::Monthly));
        assert_eq!(sub.occurrence_count, 6);
        assert!((sub.amount - 15.99).abs() < 1e-9);
        assert_eq!(
            sub.next_expected_date,
            NaiveDate::from_ymd_opt(2026, 7, 4).unwrap()
        );
    }

    #[test]
    fn test_two_occurrences_not_enough() {
        let txs = vec![
            tx("1", "2026-01-05", -9.99, "Musicbox"),
            tx("2", "2026-02-04", -9.99, "Musicbox"),
        ];
        let report = detect_recurring(&table_from(txs), &AnalysisConfig::default());
        assert!(report.charges.is_empty());
    }

    #[test]
    fn test_irregular_merchant_not_flagged() {
        let dates = ["2026-01-05", "2026-01-08", "2026-02-20", "2026-02-22"];
        let txs: Vec<_> = dates
            .iter()
            .enumerate()
            .map(|(i, d)| tx(&format!("t{}", i), d, -22.50, "Corner Store"))
            .collect();
        let report = detect_recurring(&table_from(txs), &AnalysisConfig::default());
        assert!(report.charges.is_empty());
    }

    #[test]
    fn test_ranked_by_monthly_cost() {
        let mut txs = Vec::new();
        for (i, d) in ["2026-01-01", "2026-01-31", "2026-03-02"].iter().enumerate() {
            txs.push(tx(&format!("a{}", i), d, -5.00, "Cheap"));
        }
        for (i, d) in ["2026-01-03", "2026-02-02", "2026-03-04"].iter().enumerate() {
            txs.push(tx(&format!("b{}", i), d, -60.00, "Pricey"));
        }
        let report = detect_recurring(&table_from(txs), &AnalysisConfig::default());
        assert_eq!(report.charges.len(), 2);
        assert!((report.charges[0].amount - 60.0).abs() < 1e-9);
    }
}
