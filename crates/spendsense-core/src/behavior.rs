//! Behavioral Pattern Analyzer
//!
//! Five independent heuristic detectors over the same feature table:
//!   1. Impulse: rapid back-to-back purchases with an outsized first charge
//!   2. Hyperfocus: bursts of many same-category purchases in one hour
//!   3. Stress: late-night spending running far above daytime levels
//!   4. Late-night share: a large fraction of all activity after hours
//!   5. Forgotten subscription: recurring charges with no usage signal
//!
//! Each detector is isolated: a failure in one is logged and skipped
//! without preventing the others from running.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::features::FeatureTable;
use crate::models::{BehavioralPattern, BehaviorReport, PatternKind, RecurringReport};
use crate::stats;

const IMPULSE_GAP_SECONDS: i64 = 300;
const IMPULSE_AMOUNT_MULTIPLIER: f64 = 2.0;
const HYPERFOCUS_MIN_BURST: usize = 5;
const STRESS_MULTIPLIER: f64 = 2.0;
const LATE_NIGHT_SHARE_THRESHOLD: f64 = 0.15;
const MAX_PATTERNS_PER_DETECTOR: usize = 5;

pub fn analyze_behavior(table: &FeatureTable, recurring: &RecurringReport) -> BehaviorReport {
    let mut patterns = Vec::new();

    let detectors: [(&str, Result<Vec<BehavioralPattern>>); 5] = [
        ("impulse", detect_impulse(table)),
        ("hyperfocus", detect_hyperfocus(table)),
        ("stress", detect_stress(table)),
        ("late_night", detect_late_night_share(table)),
        ("forgotten_subscription", detect_forgotten(table, recurring)),
    ];

    for (name, result) in detectors {
        match result {
            Ok(found) => {
                debug!(detector = name, count = found.len(), "Behavior detector complete");
                patterns.extend(found);
            }
            Err(e) => {
                warn!(detector = name, error = %e, "Behavior detector failed");
            }
        }
    }

    BehaviorReport { patterns }
}

/// Consecutive transactions under 5 minutes apart where the earlier
/// purchase runs well above the batch mean in an impulse-prone category.
fn detect_impulse(table: &FeatureTable) -> Result<Vec<BehavioralPattern>> {
    let batch_mean = table.mean_amount();
    if batch_mean <= 0.0 {
        return Ok(Vec::new());
    }

    let mut patterns = Vec::new();
    for pair in table.rows.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        if later.time_since_last_seconds >= IMPULSE_GAP_SECONDS {
            continue;
        }
        if earlier.amount_abs <= IMPULSE_AMOUNT_MULTIPLIER * batch_mean {
            continue;
        }
        if !crate::features::IMPULSE_CATEGORIES.contains(&earlier.category.as_str()) {
            continue;
        }

        let ratio = earlier.amount_abs / batch_mean;
        let mut confidence = 0.6 + ((ratio - IMPULSE_AMOUNT_MULTIPLIER) * 0.05).min(0.25);
        if earlier.is_late_night {
            confidence += 0.05;
        }

        patterns.push(BehavioralPattern {
            kind: PatternKind::Impulse,
            confidence: confidence.min(0.95),
            description: format!(
                "${:.2} {} purchase followed by another within {} seconds",
                earlier.amount_abs, earlier.category, later.time_since_last_seconds
            ),
            transaction_ids: vec![earlier.transaction_id.clone()],
            amount: Some(earlier.amount_abs),
        });
        if patterns.len() >= MAX_PATTERNS_PER_DETECTOR {
            break;
        }
    }
    Ok(patterns)
}

/// Five or more same-category purchases inside a single hour window.
fn detect_hyperfocus(table: &FeatureTable) -> Result<Vec<BehavioralPattern>> {
    // (date, hour, category) -> (ids, summed amount)
    let mut buckets: BTreeMap<(chrono::NaiveDate, u32, String), (Vec<String>, f64)> =
        BTreeMap::new();
    for row in &table.rows {
        let key = (row.date(), row.hour, row.category.clone());
        let entry = buckets.entry(key).or_default();
        entry.0.push(row.transaction_id.clone());
        entry.1 += row.amount_abs;
    }

    let mut patterns = Vec::new();
    for ((date, hour, category), (ids, total)) in buckets {
        if ids.len() < HYPERFOCUS_MIN_BURST {
            continue;
        }
        let confidence = (0.5 + 0.08 * ids.len() as f64).min(0.95);
        patterns.push(BehavioralPattern {
            kind: PatternKind::Hyperfocus,
            confidence,
            description: format!(
                "{} {} purchases totaling ${:.2} within one hour on {} ({:02}:00)",
                ids.len(),
                category,
                total,
                date,
                hour
            ),
            transaction_ids: ids,
            amount: Some(total),
        });
        if patterns.len() >= MAX_PATTERNS_PER_DETECTOR {
            break;
        }
    }
    Ok(patterns)
}

/// Late-night spending averaging more than twice the daytime average.
fn detect_stress(table: &FeatureTable) -> Result<Vec<BehavioralPattern>> {
    let late: Vec<f64> = table
        .rows
        .iter()
        .filter(|r| r.is_late_night)
        .map(|r| r.amount_abs)
        .collect();
    let other: Vec<f64> = table
        .rows
        .iter()
        .filter(|r| !r.is_late_night)
        .map(|r| r.amount_abs)
        .collect();

    let late_mean = stats::mean(&late);
    let other_mean = stats::mean(&other);
    if late.is_empty() || other_mean <= 0.0 || late_mean <= STRESS_MULTIPLIER * other_mean {
        return Ok(Vec::new());
    }

    let ratio = late_mean / other_mean;
    Ok(vec![BehavioralPattern {
        kind: PatternKind::Stress,
        confidence: (0.5 + (ratio - STRESS_MULTIPLIER) * 0.1).clamp(0.5, 0.9),
        description: format!(
            "Late-night purchases average ${:.2}, {:.1}x your daytime average of ${:.2}",
            late_mean, ratio, other_mean
        ),
        transaction_ids: table
            .rows
            .iter()
            .filter(|r| r.is_late_night)
            .map(|r| r.transaction_id.clone())
            .collect(),
        amount: Some(late.iter().sum()),
    }])
}

/// More than 15% of all transactions in the late-night window.
fn detect_late_night_share(table: &FeatureTable) -> Result<Vec<BehavioralPattern>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let late_count = table.rows.iter().filter(|r| r.is_late_night).count();
    let share = late_count as f64 / table.len() as f64;
    if share <= LATE_NIGHT_SHARE_THRESHOLD {
        return Ok(Vec::new());
    }

    Ok(vec![BehavioralPattern {
        kind: PatternKind::LateNight,
        confidence: (0.4 + share).min(0.9),
        description: format!(
            "{:.0}% of your purchases happen between 10pm and 6am",
            share * 100.0
        ),
        transaction_ids: Vec::new(),
        amount: None,
    }])
}

/// Cross-references detected subscriptions against recent category
/// activity. A subscription with no correlated usage signal would be a
/// forgotten-subscription candidate, but transaction history alone carries
/// no usage signal, so this currently flags nothing.
// TODO: integrate an app/service usage feed so non-usage can actually be
// confirmed before flagging a subscription here.
fn detect_forgotten(
    _table: &FeatureTable,
    recurring: &RecurringReport,
) -> Result<Vec<BehavioralPattern>> {
    let _candidates = recurring.subscriptions();
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{preprocess, Preprocessed};
    use crate::models::TransactionRecord;

    fn tx(id: &str, date: &str, amount: f64, category: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            date: date.to_string(),
            amount,
            merchant: "M".to_string(),
            category: category.to_string(),
            description: String::new(),
        }
    }

    fn table_from(txs: Vec<TransactionRecord>) -> FeatureTable {
        match preprocess(&txs, 1) {
            Preprocessed::Table(t) => t,
            _ => panic!("expected table"),
        }
    }

    /// Filler rows that establish a quiet daytime baseline around $10.
    fn baseline(n: usize) -> Vec<TransactionRecord> {
        (0..n)
            .map(|i| {
                tx(
                    &format!("base{}", i),
                    &format!("2026-01-{:02}T10:00:00", (i % 25) + 1),
                    -10.0,
                    "groceries",
                )
            })
            .collect()
    }

    #[test]
    fn test_impulse_flags_rapid_oversized_purchase() {
        let mut txs = baseline(20);
        // Batch mean ~ (200 + 3*large)/23; pick 60 so 60 > 2x mean
        txs.push(tx("big", "2026-01-26T14:00:00", -60.0, "dining"));
        txs.push(tx("next", "2026-01-26T14:01:00", -5.0, "dining"));

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        let impulse: Vec<_> = report
            .patterns
            .iter()
            .filter(|p| p.kind == PatternKind::Impulse)
            .collect();
        assert_eq!(impulse.len(), 1);
        assert_eq!(impulse[0].transaction_ids, vec!["big".to_string()]);
    }

    #[test]
    fn test_impulse_ignores_slow_pair() {
        let mut txs = baseline(20);
        txs.push(tx("big", "2026-01-26T14:00:00", -60.0, "dining"));
        txs.push(tx("next", "2026-01-26T15:00:00", -5.0, "dining"));

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        assert!(report.patterns.iter().all(|p| p.kind != PatternKind::Impulse));
    }

    #[test]
    fn test_impulse_requires_prone_category() {
        let mut txs = baseline(20);
        txs.push(tx("big", "2026-01-26T14:00:00", -60.0, "utilities"));
        txs.push(tx("next", "2026-01-26T14:01:00", -5.0, "utilities"));

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        assert!(report.patterns.iter().all(|p| p.kind != PatternKind::Impulse));
    }

    #[test]
    fn test_hyperfocus_burst() {
        let mut txs = baseline(10);
        for i in 0..6 {
            txs.push(tx(
                &format!("burst{}", i),
                &format!("2026-01-28T20:{:02}:00", i * 8),
                -12.0,
                "shopping",
            ));
        }

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        let hyper: Vec<_> = report
            .patterns
            .iter()
            .filter(|p| p.kind == PatternKind::Hyperfocus)
            .collect();
        assert_eq!(hyper.len(), 1);
        assert_eq!(hyper[0].transaction_ids.len(), 6);
        assert!((hyper[0].amount.unwrap() - 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_stress_spending() {
        let mut txs = baseline(20);
        for i in 0..4 {
            txs.push(tx(
                &format!("late{}", i),
                &format!("2026-01-{:02}T23:30:00", i + 1),
                -50.0,
                "shopping",
            ));
        }

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        let stress: Vec<_> = report
            .patterns
            .iter()
            .filter(|p| p.kind == PatternKind::Stress)
            .collect();
        assert_eq!(stress.len(), 1);
        assert!(stress[0].confidence >= 0.5);
    }

    #[test]
    fn test_late_night_share() {
        let mut txs = baseline(10);
        // 3 of 13 late-night = ~23%
        for i in 0..3 {
            txs.push(tx(
                &format!("ln{}", i),
                &format!("2026-01-{:02}T02:00:00", i + 5),
                -10.0,
                "dining",
            ));
        }

        let report = analyze_behavior(&table_from(txs), &RecurringReport::default());
        assert!(report
            .patterns
            .iter()
            .any(|p| p.kind == PatternKind::LateNight));
    }

    #[test]
    fn test_quiet_history_produces_nothing() {
        let report = analyze_behavior(&table_from(baseline(25)), &RecurringReport::default());
        assert!(report.patterns.is_empty());
    }
}
