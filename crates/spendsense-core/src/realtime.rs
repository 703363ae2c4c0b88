//! Real-Time Transaction Scorer
//!
//! Scores a single incoming transaction against a previously cached
//! baseline, without touching the batch pipeline or refitting any model.
//! Cheap enough to run synchronously on every ingestion event.
//!
//! The baseline is an explicit, versioned value object: it is built
//! wholesale from a full batch run, replaced (never mutated in place), and
//! read-only during scoring.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::features::{self, FeatureTable};
use crate::models::{RecurringReport, TransactionRecord};

/// Threshold above which a score earns a short insight string.
const INSIGHT_SCORE: f64 = 0.7;

/// Cached per-user summary statistics for cheap scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Bumped on every rebuild; replace-not-mutate
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    /// Mean absolute amount over the analyzed window
    pub average_amount: f64,
    /// Mean absolute amount per category
    pub category_averages: BTreeMap<String, f64>,
    /// Known recurring (merchant_hash, amount_cents) pairs
    pub recurring: BTreeSet<(String, i64)>,
}

impl Baseline {
    /// Build a fresh baseline from a full batch run. `previous_version`
    /// comes from the baseline being replaced (0 for the first build).
    pub fn from_analysis(
        table: &FeatureTable,
        recurring: &RecurringReport,
        previous_version: u64,
    ) -> Self {
        let mut category_averages = BTreeMap::new();
        for category in &table.categories {
            category_averages.insert(category.clone(), table.category_mean(category));
        }

        let recurring_set = recurring
            .charges
            .iter()
            .map(|c| (c.merchant_hash.clone(), (c.amount * 100.0).round() as i64))
            .collect();

        Self {
            version: previous_version + 1,
            computed_at: Utc::now(),
            average_amount: table.mean_amount(),
            category_averages,
            recurring: recurring_set,
        }
    }
}

/// Collaborator boundary for the per-user baseline cache.
pub trait BaselineStore {
    fn get_baseline(&self, user_id: &str) -> Result<Option<Baseline>>;
    fn set_baseline(&mut self, user_id: &str, baseline: Baseline) -> Result<()>;
}

/// The four independent [0, 1] scores for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealtimeScores {
    pub anomaly: f64,
    pub impulse: f64,
    pub recurring: f64,
    pub emotional: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeAssessment {
    pub transaction_id: String,
    pub scores: RealtimeScores,
    pub insights: Vec<String>,
}

/// Score one incoming transaction against the cached baseline.
pub fn score_transaction(tx: &TransactionRecord, baseline: &Baseline) -> RealtimeAssessment {
    let amount_abs = if tx.amount.is_finite() {
        tx.amount.abs()
    } else {
        0.0
    };
    let category = {
        let c = tx.category.trim().to_lowercase();
        if c.is_empty() {
            "unknown".to_string()
        } else {
            c
        }
    };

    // An unparseable timestamp just means no time-of-day signal.
    let (late_night, weekend) = match features::parse_datetime(&tx.date) {
        Some(dt) => (
            features::is_late_night_hour(dt.hour()),
            dt.weekday().num_days_from_monday() >= 5,
        ),
        None => (false, false),
    };

    let avg = baseline.average_amount;
    let impulse_category = features::IMPULSE_CATEGORIES.contains(&category.as_str());

    // Anomaly likelihood: relative deviation from the baseline average,
    // saturating at 3x deviation. The category's own cached average is
    // checked too, so a charge that is normal overall but wildly out of
    // line for its category still scores high.
    let overall_dev = if avg > 0.0 {
        (amount_abs - avg).abs() / avg
    } else {
        0.0
    };
    let category_dev = match baseline.category_averages.get(&category) {
        Some(&cat_avg) if cat_avg > 0.0 => (amount_abs - cat_avg).abs() / cat_avg,
        _ => 0.0,
    };
    let anomaly = (overall_dev.max(category_dev) / 3.0).clamp(0.0, 1.0);

    // Impulse likelihood: category + time-of-day + amount heuristics.
    let mut impulse: f64 = 0.0;
    if impulse_category {
        impulse += 0.4;
    }
    if late_night {
        impulse += 0.3;
    }
    if avg > 0.0 && amount_abs > 2.0 * avg {
        impulse += 0.3;
    }

    // Recurring likelihood: exact match against the cached recurring set.
    let cents = (amount_abs * 100.0).round() as i64;
    let recurring = if baseline
        .recurring
        .contains(&(features::merchant_hash(&tx.merchant), cents))
    {
        1.0
    } else {
        0.0
    };

    // Emotional-trigger likelihood: after-hours/weekend timing plus a
    // comfort-spend category.
    let mut emotional: f64 = 0.0;
    if late_night {
        emotional += 0.5;
    }
    if weekend {
        emotional += 0.2;
    }
    if impulse_category {
        emotional += 0.3;
    }

    let scores = RealtimeScores {
        anomaly,
        impulse: impulse.min(1.0),
        recurring,
        emotional: emotional.min(1.0),
    };

    let mut insights = Vec::new();
    if scores.anomaly >= INSIGHT_SCORE {
        insights.push(format!(
            "This ${:.2} charge is well outside your usual ${:.2} average",
            amount_abs, avg
        ));
    }
    if scores.impulse >= INSIGHT_SCORE {
        insights.push("This looks like it could be an impulse purchase".to_string());
    }
    if scores.recurring >= INSIGHT_SCORE {
        insights.push("This matches a known recurring charge".to_string());
    }
    if scores.emotional >= INSIGHT_SCORE {
        insights.push("Late-night or weekend comfort spending pattern".to_string());
    }

    RealtimeAssessment {
        transaction_id: tx.id.clone(),
        scores,
        insights,
    }
}
