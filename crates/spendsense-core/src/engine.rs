//! Analysis engine: the single entry point for a batch analysis run.
//!
//! The engine is synchronous and holds no user state. Per run it takes a
//! request (transactions included, so callers own the I/O), gates on consent
//! and volume, then walks the requested analysis types in a fixed order. One
//! analysis failing never takes down its siblings; the failure is recorded
//! in the report and the loop keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::features::{self, FeatureTable, Preprocessed};
use crate::insights;
use crate::ml::{ForestRegressor, IsolationForest, OutlierModel, Regressor};
use crate::models::{
    AnalysisKind, AnalysisOutcome, AnalysisReport, AnalysisStatus, TransactionRecord,
};
use crate::realtime::{Baseline, BaselineStore};
use crate::{anomaly, behavior, forecast, recurring, trends};

/// Tunable thresholds for a run. `Default` matches production settings;
/// tests shrink the gates to keep fixtures small.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Hard floor below which no analysis runs at all
    pub min_transactions: usize,
    /// Default analysis window when the request doesn't set one
    pub window_days: u32,
    /// Occurrences a (merchant, amount) group needs before it can recur
    pub min_recurring_occurrences: usize,
    /// Gap consistency above which a monthly-cadence group is a subscription
    pub subscription_consistency: f64,
    /// Gap consistency above which a group counts as recurring at all
    pub recurring_consistency: f64,
    /// Inclusive mean-gap band (days) treated as monthly cadence
    pub monthly_gap_min: f64,
    pub monthly_gap_max: f64,
    /// Rows needed before the outlier model is worth fitting
    pub min_anomaly_rows: usize,
    /// Share of training rows the outlier model may flag
    pub contamination: f64,
    /// Distinct spending days needed before forecasting
    pub min_forecast_days: usize,
    /// Cap on synthesized insights per report
    pub max_insights: usize,
    /// Seed for every model fit; same data + same seed = same report
    pub seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_transactions: 50,
            window_days: 90,
            min_recurring_occurrences: 3,
            subscription_consistency: 0.8,
            recurring_consistency: 0.7,
            monthly_gap_min: 25.0,
            monthly_gap_max: 35.0,
            min_anomaly_rows: 10,
            contamination: 0.1,
            min_forecast_days: 30,
            max_insights: 5,
            seed: 42,
        }
    }
}

/// Cooperative cancellation checked between analysis types. A fit already
/// in progress runs to completion; the next one won't start.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that trips on its own once `budget` has elapsed.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// Everything one batch run needs. Transactions arrive in the request so
/// the engine never talks to storage itself.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub user_id: String,
    /// Result of the caller's ML-consent check for this user
    pub consent: bool,
    pub transactions: Vec<TransactionRecord>,
    /// Analysis types to run, in the order given (duplicates ignored)
    pub requested: Vec<AnalysisKind>,
    /// Lookback window in days, measured from the newest transaction
    pub window_days: Option<u32>,
}

impl AnalysisRequest {
    /// Request for all analysis types with the default window.
    pub fn full(user_id: impl Into<String>, consent: bool, transactions: Vec<TransactionRecord>) -> Self {
        Self {
            user_id: user_id.into(),
            consent,
            transactions,
            requested: AnalysisKind::all().to_vec(),
            window_days: None,
        }
    }
}

/// Where transactions come from when the engine drives the whole run
/// itself via [`AnalysisEngine::run_for_user`].
pub trait TransactionSource {
    fn transactions(&self, user_id: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<TransactionRecord>>;
}

/// The caller's consent registry. The engine only ever asks yes/no.
pub trait ConsentSource {
    fn has_ml_consent(&self, user_id: &str) -> Result<bool>;
}

pub struct AnalysisEngine {
    config: AnalysisConfig,
    outlier: Box<dyn OutlierModel>,
    regressor: Box<dyn Regressor>,
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngine {
    pub fn new() -> Self {
        Self::with_config(AnalysisConfig::default())
    }

    pub fn with_config(config: AnalysisConfig) -> Self {
        let mut outlier = IsolationForest::new(config.seed);
        outlier.contamination = config.contamination;
        let regressor = ForestRegressor::new(config.seed);
        Self {
            config,
            outlier: Box::new(outlier),
            regressor: Box::new(regressor),
        }
    }

    /// Swap in alternative model strategies (used by tests and callers
    /// experimenting with different detectors).
    pub fn with_models(
        config: AnalysisConfig,
        outlier: Box<dyn OutlierModel>,
        regressor: Box<dyn Regressor>,
    ) -> Self {
        Self { config, outlier, regressor }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, request: &AnalysisRequest) -> AnalysisReport {
        self.run_with_cancel(request, &CancelToken::new())
    }

    pub fn run_with_cancel(&self, request: &AnalysisRequest, cancel: &CancelToken) -> AnalysisReport {
        self.run_internal(request, cancel).0
    }

    /// Full run that also hands back the windowed feature table (present
    /// only when the gates passed), so callers rebuilding the realtime
    /// baseline reuse the exact data the analyses saw.
    fn run_internal(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> (AnalysisReport, Option<FeatureTable>) {
        let window_days = request.window_days.unwrap_or(self.config.window_days);

        if !request.consent {
            info!(user_id = %request.user_id, "ML consent not granted, skipping analysis");
            return (
                AnalysisReport::empty(AnalysisStatus::ConsentRequired, 0, window_days),
                None,
            );
        }

        let windowed = trim_to_window(&request.transactions, window_days);

        let table = match features::preprocess(&windowed, self.config.min_transactions) {
            Preprocessed::Table(table) => table,
            Preprocessed::InsufficientData { count, required } => {
                debug!(user_id = %request.user_id, count, required, "Not enough transactions");
                return (
                    AnalysisReport::empty(
                        AnalysisStatus::InsufficientData {
                            transaction_count: count,
                            required,
                        },
                        count,
                        window_days,
                    ),
                    None,
                );
            }
        };

        info!(
            user_id = %request.user_id,
            transactions = table.len(),
            window_days,
            "Running analysis"
        );

        let mut analyses = Vec::new();
        let mut seen = Vec::new();
        for &kind in &request.requested {
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            if cancel.is_cancelled() {
                warn!(user_id = %request.user_id, analysis = %kind, "Run cancelled");
                analyses.push(AnalysisOutcome::Failed {
                    failed: kind,
                    message: crate::error::Error::Cancelled.to_string(),
                });
                continue;
            }

            match self.run_one(kind, &table) {
                Ok(outcome) => analyses.push(outcome),
                Err(e) => {
                    warn!(user_id = %request.user_id, analysis = %kind, error = %e, "Analysis failed");
                    analyses.push(AnalysisOutcome::Failed {
                        failed: kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        let insights = insights::synthesize(&analyses, self.config.max_insights);

        let report = AnalysisReport {
            status: AnalysisStatus::Ok,
            analyses,
            insights,
            total_transactions: table.len(),
            time_period_days: window_days,
        };
        (report, Some(table))
    }

    fn run_one(&self, kind: AnalysisKind, table: &FeatureTable) -> Result<AnalysisOutcome> {
        let outcome = match kind {
            AnalysisKind::Recurring => {
                AnalysisOutcome::Recurring(recurring::detect_recurring(table, &self.config))
            }
            AnalysisKind::Anomalies => AnalysisOutcome::Anomalies(anomaly::detect_anomalies(
                table,
                self.outlier.as_ref(),
                &self.config,
            )),
            AnalysisKind::Forecast => AnalysisOutcome::Forecast(forecast::forecast_spending(
                table,
                self.regressor.as_ref(),
                &self.config,
            )),
            AnalysisKind::Behavior => {
                // Behavioral detectors cross-reference recurring groups, so
                // those are derived here even when not requested themselves.
                let recurring = recurring::detect_recurring(table, &self.config);
                AnalysisOutcome::Behavior(behavior::analyze_behavior(table, &recurring))
            }
            AnalysisKind::Trends => AnalysisOutcome::Trends(trends::analyze_trends(table)),
        };
        Ok(outcome)
    }

    /// Drive a full run from collaborator traits: consent check, fetch,
    /// analyze, then refresh the realtime baseline on success.
    pub fn run_for_user(
        &self,
        user_id: &str,
        transactions: &dyn TransactionSource,
        consent: &dyn ConsentSource,
        baselines: &mut dyn BaselineStore,
    ) -> Result<AnalysisReport> {
        let window_days = self.config.window_days;

        if !consent.has_ml_consent(user_id)? {
            info!(user_id, "ML consent not granted, skipping analysis");
            return Ok(AnalysisReport::empty(
                AnalysisStatus::ConsentRequired,
                0,
                window_days,
            ));
        }

        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(i64::from(window_days));
        let records = transactions.transactions(user_id, start, end)?;

        let request = AnalysisRequest {
            user_id: user_id.to_string(),
            consent: true,
            transactions: records,
            requested: AnalysisKind::all().to_vec(),
            window_days: Some(window_days),
        };
        let (report, table) = self.run_internal(&request, &CancelToken::new());

        if let Some(table) = table {
            // The baseline comes from the same windowed table the analyses
            // ran on, reusing the recurring outcome already computed.
            let fallback;
            let recurring = match report.outcome(AnalysisKind::Recurring) {
                Some(AnalysisOutcome::Recurring(r)) => r,
                _ => {
                    fallback = recurring::detect_recurring(&table, &self.config);
                    &fallback
                }
            };
            let previous = baselines
                .get_baseline(user_id)?
                .map(|b| b.version)
                .unwrap_or(0);
            baselines.set_baseline(
                user_id,
                Baseline::from_analysis(&table, recurring, previous),
            )?;
            debug!(user_id, "Realtime baseline refreshed");
        }

        Ok(report)
    }
}

/// Keep only transactions within `window_days` of the newest parseable
/// transaction date. Rows with unparseable dates are kept and left to the
/// preprocessing coercion.
fn trim_to_window(transactions: &[TransactionRecord], window_days: u32) -> Vec<TransactionRecord> {
    let newest = transactions
        .iter()
        .filter_map(|t| features::parse_datetime(&t.date))
        .map(|dt| dt.date())
        .max();
    let Some(newest) = newest else {
        return transactions.to_vec();
    };
    let cutoff = newest - ChronoDuration::days(i64::from(window_days));

    transactions
        .iter()
        .filter(|t| match features::parse_datetime(&t.date) {
            Some(dt) => dt.date() >= cutoff,
            None => true,
        })
        .cloned()
        .collect()
}
