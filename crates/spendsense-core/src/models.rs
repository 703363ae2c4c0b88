//! Domain models for spendsense
//!
//! Raw transaction records come in from the storage collaborator; everything
//! else here is an ephemeral analysis result, created per call and never
//! mutated after construction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single transaction as delivered by the storage collaborator.
///
/// `date` is an ISO-8601 string; parsing (and coercion of malformed values)
/// happens in the feature preprocessor so one bad row can't sink a batch.
/// Negative amounts are expenses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub date: String,
    pub amount: f64,
    pub merchant: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// The analysis types a caller can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Recurring charges and subscriptions
    Recurring,
    /// Model-based outlier detection
    Anomalies,
    /// 30-day spending forecast
    Forecast,
    /// Attention/impulsivity-linked spending patterns
    Behavior,
    /// Per-category weekly trends
    Trends,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Recurring => "recurring",
            AnalysisKind::Anomalies => "anomalies",
            AnalysisKind::Forecast => "forecast",
            AnalysisKind::Behavior => "behavior",
            AnalysisKind::Trends => "trends",
        }
    }

    /// All kinds, in pipeline execution order.
    pub fn all() -> [AnalysisKind; 5] {
        [
            AnalysisKind::Recurring,
            AnalysisKind::Anomalies,
            AnalysisKind::Forecast,
            AnalysisKind::Behavior,
            AnalysisKind::Trends,
        ]
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "recurring" => Ok(Self::Recurring),
            "anomalies" => Ok(Self::Anomalies),
            "forecast" => Ok(Self::Forecast),
            "behavior" => Ok(Self::Behavior),
            "trends" => Ok(Self::Trends),
            _ => Err(format!("Unknown analysis kind: {}", s)),
        }
    }
}

/// Overall outcome of a full analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Analysis ran; individual analyses may still have failed
    Ok,
    /// User has not granted ML consent; transactions were never inspected
    ConsentRequired,
    /// Below the minimum transaction gate; counts included so the caller
    /// can show progress toward the threshold
    InsufficientData {
        transaction_count: usize,
        required: usize,
    },
    /// Nothing could run at all
    Error { message: String },
}

/// Coarse cadence of a recurring charge, bucketed from the mean gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Bucket a mean day-gap into the nearest cadence.
    /// Gaps beyond a year don't map to any subscription-like cadence.
    pub fn from_mean_gap(days: f64) -> Option<Frequency> {
        if days < 10.0 {
            Some(Frequency::Weekly)
        } else if days < 45.0 {
            Some(Frequency::Monthly)
        } else if days < 400.0 {
            Some(Frequency::Yearly)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected recurring charge; `is_subscription` marks the stricter
/// monthly classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringCharge {
    /// Privacy-hashed merchant; raw merchant strings never leave the
    /// preprocessor
    pub merchant_hash: String,
    /// Charge amount (absolute)
    pub amount: f64,
    /// Mean gap between occurrences, in days
    pub frequency_days: f64,
    /// 1 - stdev(gaps)/mean(gaps), clamped to [0, 1]
    pub consistency_score: f64,
    pub occurrence_count: usize,
    /// Normalized cost per 30 days, used for ranking
    pub monthly_cost: f64,
    pub frequency: Option<Frequency>,
    pub next_expected_date: NaiveDate,
    pub is_subscription: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringReport {
    /// Sorted by monthly cost descending; consistency ties broken by
    /// longer occurrence history
    pub charges: Vec<RecurringCharge>,
}

impl RecurringReport {
    /// Only the charges that classified as subscriptions.
    pub fn subscriptions(&self) -> impl Iterator<Item = &RecurringCharge> {
        self.charges.iter().filter(|c| c.is_subscription)
    }
}

/// A transaction flagged by the outlier model.
///
/// `score` follows the decision-function convention: higher is more normal,
/// flagged points sit strictly below the fitted threshold. Ranking ascends
/// from the most negative score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub transaction_id: String,
    pub score: f64,
    pub is_anomaly: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    /// Flagged transactions, most anomalous first
    pub anomalies: Vec<Anomaly>,
    /// Score threshold the model settled on (contamination quantile)
    pub threshold: f64,
    /// How many rows were evaluated
    pub evaluated: usize,
}

/// One day of the spending forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrediction {
    pub date: NaiveDate,
    pub predicted_amount: f64,
    /// predicted - 1.96 * residual stdev, clamped at 0
    pub confidence_lower: f64,
    /// predicted + 1.96 * residual stdev
    pub confidence_upper: f64,
}

/// Holdout-derived confidence label for the forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy > 0.8 {
            Self::High
        } else if accuracy > 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    /// Next 30 calendar days; empty when fewer than 30 daily buckets were
    /// observed
    pub predictions: Vec<DailyPrediction>,
    /// Sum of the first 7 daily predictions (exact)
    pub weekly_total: f64,
    /// Sum of all 30 daily predictions
    pub monthly_total: f64,
    /// 1 - MAE/mean(actual) on the holdout, clamped to [0, 1]
    pub accuracy: f64,
    pub confidence: Option<ConfidenceLabel>,
}

/// One of the five heuristic behavioral signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Impulse,
    Hyperfocus,
    Stress,
    LateNight,
    ForgottenSubscription,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impulse => "impulse",
            Self::Hyperfocus => "hyperfocus",
            Self::Stress => "stress",
            Self::LateNight => "late_night",
            Self::ForgottenSubscription => "forgotten_subscription",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A behavioral pattern flagged by one of the independent detectors.
/// Multiple patterns may reference the same transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralPattern {
    pub kind: PatternKind,
    pub confidence: f64,
    pub description: String,
    /// Transactions supporting the pattern
    pub transaction_ids: Vec<String>,
    /// Dollar amount involved, where the pattern has one
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorReport {
    pub patterns: Vec<BehavioralPattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Weekly spending trend for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: String,
    /// Slope of the least-squares fit over weekly totals
    pub slope: f64,
    pub direction: TrendDirection,
    /// stdev(weekly totals) / mean(weekly totals)
    pub variability: f64,
    pub weekly_average: f64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Sorted by total category spend descending
    pub trends: Vec<CategoryTrend>,
    /// Category with the highest variability, reported separately
    pub most_variable: Option<String>,
}

/// Tone of a synthesized insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightTone {
    Positive,
    Warning,
    Neutral,
}

/// A ranked, user-facing insight. Never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Deterministic id: "<kind>:<ordinal>"
    pub id: String,
    pub title: String,
    pub description: String,
    pub tone: InsightTone,
    pub confidence: f64,
    pub actionable_tips: Vec<String>,
    pub affected_amount: Option<f64>,
}

/// Result of one requested analysis. A closed set so callers pattern-match
/// exhaustively instead of probing a dictionary for keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Recurring(RecurringReport),
    Anomalies(AnomalyReport),
    Forecast(ForecastReport),
    Behavior(BehaviorReport),
    Trends(TrendReport),
    /// The analysis for this kind failed; siblings still ran
    Failed { failed: AnalysisKind, message: String },
}

impl AnalysisOutcome {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::Recurring(_) => AnalysisKind::Recurring,
            Self::Anomalies(_) => AnalysisKind::Anomalies,
            Self::Forecast(_) => AnalysisKind::Forecast,
            Self::Behavior(_) => AnalysisKind::Behavior,
            Self::Trends(_) => AnalysisKind::Trends,
            Self::Failed { failed, .. } => *failed,
        }
    }
}

/// Envelope returned to the caller for a full analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub status: AnalysisStatus,
    pub analyses: Vec<AnalysisOutcome>,
    pub insights: Vec<Insight>,
    pub total_transactions: usize,
    pub time_period_days: u32,
}

impl AnalysisReport {
    /// Shorthand for the hard-stop envelopes that carry no analyses.
    pub fn empty(status: AnalysisStatus, total_transactions: usize, window_days: u32) -> Self {
        Self {
            status,
            analyses: Vec::new(),
            insights: Vec::new(),
            total_transactions,
            time_period_days: window_days,
        }
    }

    /// Find the outcome for a given kind, if it was requested.
    pub fn outcome(&self, kind: AnalysisKind) -> Option<&AnalysisOutcome> {
        self.analyses.iter().find(|a| a.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_analysis_kind_round_trip() {
        for kind in AnalysisKind::all() {
            assert_eq!(AnalysisKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(AnalysisKind::from_str("bogus").is_err());
    }

    #[test]
    fn test_frequency_bucketing() {
        assert_eq!(Frequency::from_mean_gap(7.2), Some(Frequency::Weekly));
        assert_eq!(Frequency::from_mean_gap(30.0), Some(Frequency::Monthly));
        assert_eq!(Frequency::from_mean_gap(365.0), Some(Frequency::Yearly));
        assert_eq!(Frequency::from_mean_gap(900.0), None);
    }

    #[test]
    fn test_confidence_label_thresholds() {
        assert_eq!(ConfidenceLabel::from_accuracy(0.85), ConfidenceLabel::High);
        assert_eq!(ConfidenceLabel::from_accuracy(0.8), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_accuracy(0.61), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_accuracy(0.2), ConfidenceLabel::Low);
    }

    #[test]
    fn test_status_serialization() {
        let status = AnalysisStatus::InsufficientData {
            transaction_count: 12,
            required: 50,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "insufficient_data");
        assert_eq!(json["transaction_count"], 12);
    }
}
