//! Feature Preprocessor
//!
//! Normalizes raw transaction records into a privacy-protected, derived
//! feature table. Pure transform: no side effects, rows are never mutated
//! after creation. Malformed rows are coerced to neutral defaults rather
//! than aborting the batch.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

use crate::models::TransactionRecord;

/// Width of the hex merchant digest. Irreversible but stable, so grouping
/// by merchant still works without the raw string.
const MERCHANT_HASH_LEN: usize = 16;

/// Hours counted as late-night: 22:00-24:00 and 00:00-06:00.
pub fn is_late_night_hour(hour: u32) -> bool {
    hour >= 22 || hour < 6
}

/// Categories prone to impulse purchases. Matched against the lowercased
/// category this module emits, by both the batch and real-time paths.
pub const IMPULSE_CATEGORIES: [&str; 3] = ["shopping", "entertainment", "dining"];

/// Irreversibly hash a merchant name to a fixed-width hex digest.
///
/// Case and surrounding whitespace are folded first so "Netflix " and
/// "NETFLIX" land in the same group.
pub fn merchant_hash(merchant: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(merchant.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..MERCHANT_HASH_LEN].to_string()
}

/// One derived row per transaction, 1:1 with the input record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub transaction_id: String,
    pub datetime: NaiveDateTime,
    pub amount_abs: f64,
    /// ln(1 + amount_abs)
    pub amount_log: f64,
    pub hour: u32,
    /// Monday=0 .. Sunday=6
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub is_late_night: bool,
    /// Gap to the previous transaction in sorted order; 0 for the first
    pub time_since_last_seconds: i64,
    /// Lowercased category string; "unknown" when missing
    pub category: String,
    /// Stable integer id per distinct category in this batch
    pub category_encoded: usize,
    pub merchant_hash: String,
}

impl FeatureRow {
    pub fn date(&self) -> NaiveDate {
        self.datetime.date()
    }
}

/// The preprocessed batch handed to every detector.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    /// Distinct categories in first-observation order; index = encoded id
    pub categories: Vec<String>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mean of amount_abs over the whole batch.
    pub fn mean_amount(&self) -> f64 {
        crate::stats::mean(&self.rows.iter().map(|r| r.amount_abs).collect::<Vec<_>>())
    }

    /// Mean of amount_abs for one category.
    pub fn category_mean(&self, category: &str) -> f64 {
        let amounts: Vec<f64> = self
            .rows
            .iter()
            .filter(|r| r.category == category)
            .map(|r| r.amount_abs)
            .collect();
        crate::stats::mean(&amounts)
    }

    /// Days spanned by the batch, inclusive. 0 for an empty table.
    pub fn span_days(&self) -> i64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => {
                (last.datetime.date() - first.datetime.date()).num_days() + 1
            }
            _ => 0,
        }
    }
}

/// Outcome of preprocessing: either a usable table or a signal that the
/// history is below the minimum gate.
#[derive(Debug)]
pub enum Preprocessed {
    Table(FeatureTable),
    InsufficientData { count: usize, required: usize },
}

/// Parse a transaction date string, accepting full timestamps and
/// date-only values (midnight assumed).
pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

/// Build the feature table from raw records.
///
/// Rows are sorted by parsed timestamp before gap derivation. A row with an
/// unparseable date keeps the previous valid row's timestamp (neutral zero
/// gap); a non-finite amount becomes 0.0; an empty category becomes
/// "unknown". Nothing here can fail the whole batch.
pub fn preprocess(transactions: &[TransactionRecord], min_transactions: usize) -> Preprocessed {
    if transactions.len() < min_transactions {
        return Preprocessed::InsufficientData {
            count: transactions.len(),
            required: min_transactions,
        };
    }

    // Parse up front so coerced rows sort alongside their neighbors.
    let epoch = chrono::DateTime::UNIX_EPOCH.naive_utc();
    let mut parsed: Vec<(NaiveDateTime, &TransactionRecord, bool)> = Vec::new();
    let mut last_valid = epoch;
    let mut coerced = 0usize;

    for tx in transactions {
        match parse_datetime(&tx.date) {
            Some(dt) => {
                last_valid = dt;
                parsed.push((dt, tx, true));
            }
            None => {
                coerced += 1;
                parsed.push((last_valid, tx, false));
            }
        }
    }

    if coerced > 0 {
        debug!(coerced, total = transactions.len(), "Coerced rows with unparseable dates");
    }

    parsed.sort_by_key(|(dt, _, _)| *dt);

    let mut categories: Vec<String> = Vec::new();
    let mut category_ids: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::with_capacity(parsed.len());
    let mut prev: Option<NaiveDateTime> = None;

    for (dt, tx, _valid) in parsed {
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
        let category_encoded = *category_ids.entry(category.clone()).or_insert_with(|| {
            categories.push(category.clone());
            categories.len() - 1
        });

        let gap = match prev {
            Some(p) => (dt - p).num_seconds().max(0),
            None => 0,
        };
        prev = Some(dt);

        let hour = dt.hour();
        let day_of_week = dt.weekday().num_days_from_monday();

        rows.push(FeatureRow {
            transaction_id: tx.id.clone(),
            datetime: dt,
            amount_abs,
            amount_log: (1.0 + amount_abs).ln(),
            hour,
            day_of_week,
            month: dt.month(),
            is_weekend: day_of_week >= 5,
            is_late_night: is_late_night_hour(hour),
            time_since_last_seconds: gap,
            category,
            category_encoded,
            merchant_hash: merchant_hash(&tx.merchant),
        });
    }

    Preprocessed::Table(FeatureTable { rows, categories })
}
