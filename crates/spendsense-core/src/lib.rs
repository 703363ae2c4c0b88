//! SpendSense Core Library
//!
//! Transaction intelligence for the SpendSense personal finance tool:
//! - Batch analysis engine with consent and volume gates
//! - Recurring charge and subscription detection
//! - Isolation-forest anomaly detection over engineered features
//! - Tree-ensemble 30-day spending forecast with holdout accuracy
//! - Behavioral pattern detectors (impulse, hyperfocus, stress,
//!   late-night, forgotten subscriptions)
//! - Weekly category trend analysis
//! - Realtime single-transaction scoring against a cached baseline
//! - Insight synthesizer that ranks findings into a capped digest

pub mod anomaly;
pub mod behavior;
pub mod engine;
pub mod error;
pub mod features;
pub mod forecast;
pub mod insights;
pub mod ml;
pub mod models;
pub mod realtime;
pub mod recurring;
pub mod stats;
pub mod trends;

pub use engine::{
    AnalysisConfig, AnalysisEngine, AnalysisRequest, CancelToken, ConsentSource,
    TransactionSource,
};
pub use error::{Error, Result};
pub use ml::{FittedOutlier, FittedRegressor, ForestRegressor, IsolationForest, OutlierModel, Regressor};
pub use models::{
    AnalysisKind, AnalysisOutcome, AnalysisReport, AnalysisStatus, Anomaly, AnomalyReport,
    BehavioralPattern, BehaviorReport, CategoryTrend, ConfidenceLabel, DailyPrediction,
    ForecastReport, Frequency, Insight, InsightTone, PatternKind, RecurringCharge,
    RecurringReport, TransactionRecord, TrendDirection, TrendReport,
};
pub use realtime::{score_transaction, Baseline, BaselineStore, RealtimeAssessment, RealtimeScores};
