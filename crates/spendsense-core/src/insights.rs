//! Insight Synthesizer
//!
//! Pure aggregation step: converts each analysis outcome into candidate
//! user-facing insights and returns a ranked, capped list. Every analysis
//! type that fired gets at least one slot before remaining slots fill by
//! confidence. No detection logic lives here.

use crate::models::{
    AnalysisOutcome, Insight, InsightTone, PatternKind, TrendDirection,
};

/// A candidate before ranking assigns ids.
struct Candidate {
    title: String,
    description: String,
    tone: InsightTone,
    confidence: f64,
    tips: Vec<String>,
    amount: Option<f64>,
}

fn recurring_candidates(report: &crate::models::RecurringReport) -> Vec<Candidate> {
    let mut out = Vec::new();

    let subs: Vec<_> = report.subscriptions().collect();
    if !subs.is_empty() {
        let monthly: f64 = subs.iter().map(|s| s.monthly_cost).sum();
        out.push(Candidate {
            title: format!("{} active subscriptions", subs.len()),
            description: format!(
                "Your detected subscriptions add up to about ${:.2} per month.",
                monthly
            ),
            tone: InsightTone::Neutral,
            confidence: subs
                .iter()
                .map(|s| s.consistency_score)
                .fold(0.0, f64::max),
            tips: vec![
                "Review each subscription and cancel any you no longer use".to_string(),
                "Set a calendar reminder before the next expected charge".to_string(),
            ],
            amount: Some(monthly),
        });
    }

    if let Some(top) = report.charges.first() {
        if !top.is_subscription {
            out.push(Candidate {
                title: "Recurring charge detected".to_string(),
                description: format!(
                    "A ${:.2} charge repeats about every {:.0} days.",
                    top.amount, top.frequency_days
                ),
                tone: InsightTone::Neutral,
                confidence: top.consistency_score,
                tips: vec!["Check whether this recurring charge is intentional".to_string()],
                amount: Some(top.monthly_cost),
            });
        }
    }

    out
}

fn anomaly_candidates(report: &crate::models::AnomalyReport) -> Vec<Candidate> {
    if report.anomalies.is_empty() {
        return Vec::new();
    }
    let count = report.anomalies.len();
    vec![Candidate {
        title: format!(
            "{} unusual transaction{}",
            count,
            if count == 1 { "" } else { "s" }
        ),
        description: format!(
            "Out of {} transactions, {} stood out: {}",
            report.evaluated, count, report.anomalies[0].explanation
        ),
        tone: InsightTone::Warning,
        confidence: (0.6 + 0.05 * count as f64).min(0.9),
        tips: vec!["Check these charges against your receipts".to_string()],
        amount: None,
    }]
}

fn forecast_candidates(report: &crate::models::ForecastReport) -> Vec<Candidate> {
    if report.predictions.is_empty() {
        return Vec::new();
    }
    vec![Candidate {
        title: "Spending forecast".to_string(),
        description: format!(
            "You're on track to spend about ${:.0} next week and ${:.0} over the next 30 days.",
            report.weekly_total, report.monthly_total
        ),
        tone: InsightTone::Neutral,
        confidence: report.accuracy,
        tips: vec!["Set aside the forecast amount at the start of the week".to_string()],
        amount: Some(report.monthly_total),
    }]
}

fn behavior_candidates(report: &crate::models::BehaviorReport) -> Vec<Candidate> {
    report
        .patterns
        .iter()
        .map(|p| {
            let (title, tips) = match p.kind {
                PatternKind::Impulse => (
                    "Possible impulse purchase".to_string(),
                    vec!["Try a 24-hour wait rule for purchases over your average".to_string()],
                ),
                PatternKind::Hyperfocus => (
                    "Shopping burst detected".to_string(),
                    vec!["Consider a cart cooldown before checking out again".to_string()],
                ),
                PatternKind::Stress => (
                    "Late-night spending runs high".to_string(),
                    vec!["Move big purchase decisions to daytime hours".to_string()],
                ),
                PatternKind::LateNight => (
                    "Frequent late-night purchases".to_string(),
                    vec!["App timers after 10pm can help break the loop".to_string()],
                ),
                PatternKind::ForgottenSubscription => (
                    "Possibly forgotten subscription".to_string(),
                    vec!["Confirm you still use this service".to_string()],
                ),
            };
            Candidate {
                title,
                description: p.description.clone(),
                tone: InsightTone::Warning,
                confidence: p.confidence,
                tips,
                amount: p.amount,
            }
        })
        .collect()
}

fn trend_candidates(report: &crate::models::TrendReport) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(rising) = report
        .trends
        .iter()
        .find(|t| t.direction == TrendDirection::Increasing)
    {
        out.push(Candidate {
            title: format!("{} spending is climbing", rising.category),
            description: format!(
                "Weekly {} spending is rising by about ${:.2} per week (average ${:.2}/week).",
                rising.category, rising.slope, rising.weekly_average
            ),
            tone: InsightTone::Warning,
            confidence: 0.7,
            tips: vec![format!("Set a weekly budget for {}", rising.category)],
            amount: Some(rising.total_amount),
        });
    }
    if let Some(falling) = report
        .trends
        .iter()
        .find(|t| t.direction == TrendDirection::Decreasing)
    {
        out.push(Candidate {
            title: format!("{} spending is trending down", falling.category),
            description: format!(
                "Weekly {} spending is falling by about ${:.2} per week. Nice work.",
                falling.category,
                falling.slope.abs()
            ),
            tone: InsightTone::Positive,
            confidence: 0.65,
            tips: Vec::new(),
            amount: Some(falling.total_amount),
        });
    }

    out
}

/// Merge all analysis outcomes into at most `cap` ranked insights.
pub fn synthesize(analyses: &[AnalysisOutcome], cap: usize) -> Vec<Insight> {
    // Candidates grouped per analysis outcome, preserving pipeline order.
    let grouped: Vec<(crate::models::AnalysisKind, Vec<Candidate>)> = analyses
        .iter()
        .map(|outcome| {
            let candidates = match outcome {
                AnalysisOutcome::Recurring(r) => recurring_candidates(r),
                AnalysisOutcome::Anomalies(r) => anomaly_candidates(r),
                AnalysisOutcome::Forecast(r) => forecast_candidates(r),
                AnalysisOutcome::Behavior(r) => behavior_candidates(r),
                AnalysisOutcome::Trends(r) => trend_candidates(r),
                AnalysisOutcome::Failed { .. } => Vec::new(),
            };
            (outcome.kind(), candidates)
        })
        .collect();

    // First pass: the best candidate from every analysis that fired, so
    // each firing type is represented before anything else competes.
    let mut picked: Vec<(crate::models::AnalysisKind, Candidate)> = Vec::new();
    let mut leftovers: Vec<(crate::models::AnalysisKind, Candidate)> = Vec::new();

    for (kind, mut candidates) in grouped {
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut iter = candidates.into_iter();
        if let Some(best) = iter.next() {
            picked.push((kind, best));
        }
        leftovers.extend(iter.map(|c| (kind, c)));
    }

    // Second pass: fill remaining slots by confidence.
    leftovers.sort_by(|a, b| {
        b.1.confidence
            .partial_cmp(&a.1.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    picked.extend(leftovers);
    picked.truncate(cap);

    picked
        .into_iter()
        .enumerate()
        .map(|(i, (kind, c))| Insight {
            id: format!("{}:{}", kind.as_str(), i),
            title: c.title,
            description: c.description,
            tone: c.tone,
            confidence: c.confidence,
            actionable_tips: c.tips,
            affected_amount: c.amount,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnalysisKind, Anomaly, AnomalyReport, BehavioralPattern, BehaviorReport, Frequency,
        RecurringCharge, RecurringReport,
    };
    use chrono::NaiveDate;

    fn sample_charge(is_subscription: bool) -> RecurringCharge {
        RecurringCharge {
            merchant_hash: "abcd1234abcd1234".to_string(),
            amount: 15.99,
            frequency_days: 30.0,
            consistency_score: 0.95,
            occurrence_count: 6,
            monthly_cost: 15.99,
            frequency: Some(Frequency::Monthly),
            next_expected_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            is_subscription,
        }
    }

    fn sample_anomaly_report() -> AnomalyReport {
        AnomalyReport {
            anomalies: vec![Anomaly {
                transaction_id: "t1".to_string(),
                score: -0.2,
                is_anomaly: true,
                explanation: "amount $500.00 is over 3x your average of $20.00".to_string(),
            }],
            threshold: -0.05,
            evaluated: 80,
        }
    }

    #[test]
    fn test_each_fired_type_represented() {
        let analyses = vec![
            AnalysisOutcome::Recurring(RecurringReport {
                charges: vec![sample_charge(true)],
            }),
            AnalysisOutcome::Anomalies(sample_anomaly_report()),
        ];
        let insights = synthesize(&analyses, 5);
        assert_eq!(insights.len(), 2);
        assert!(insights[0].id.starts_with("recurring:"));
        assert!(insights[1].id.starts_with("anomalies:"));
    }

    #[test]
    fn test_cap_is_enforced() {
        let patterns: Vec<BehavioralPattern> = (0..8)
            .map(|i| BehavioralPattern {
                kind: crate::models::PatternKind::Impulse,
                confidence: 0.9 - i as f64 * 0.05,
                description: format!("pattern {}", i),
                transaction_ids: Vec::new(),
                amount: None,
            })
            .collect();
        let analyses = vec![
            AnalysisOutcome::Behavior(BehaviorReport { patterns }),
            AnalysisOutcome::Anomalies(sample_anomaly_report()),
        ];
        let insights = synthesize(&analyses, 5);
        assert_eq!(insights.len(), 5);
    }

    #[test]
    fn test_empty_and_failed_outcomes_contribute_nothing() {
        let analyses = vec![
            AnalysisOutcome::Anomalies(AnomalyReport::default()),
            AnalysisOutcome::Failed {
                failed: AnalysisKind::Forecast,
                message: "boom".to_string(),
            },
        ];
        assert!(synthesize(&analyses, 5).is_empty());
    }

    #[test]
    fn test_ids_are_deterministic() {
        let analyses = vec![AnalysisOutcome::Anomalies(sample_anomaly_report())];
        let a = synthesize(&analyses, 5);
        let b = synthesize(&analyses, 5);
        assert_eq!(a, b);
        assert_eq!(a[0].id, "anomalies:0");
    }
}
