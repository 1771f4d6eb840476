//! Narrative requester: fact-bounded context, collaborator client, and
//! strict validation of the collaborator's untrusted response.
//!
//! The collaborator only ever sees a [`NarrativeContext`] built from the
//! analysis, and its response is stripped of anything that cannot be traced
//! back to that context. When the collaborator is unavailable or times out
//! the pipeline degrades to [`Narrative::fallback`], a deterministic
//! narrative generated from the same facts.

mod client;
mod context;

pub use client::NarrativeClient;
pub use context::{AnomalyFact, CorrelationFact, NarrativeContext};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ReportConfig;
use crate::error::{NarrativeError, NarrativeResult};
use crate::kpi::metric_base_name;

/// Placeholder prefix used when the collaborator could not be reached.
pub const FALLBACK_SUMMARY_NOTE: &str = "AI summary unavailable.";

/// A validated narrative, ready for report assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub highlights: Vec<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    /// False when this narrative was generated by the deterministic
    /// fallback rather than the collaborator.
    pub ai_generated: bool,
}

/// Untrusted wire shape of the collaborator response. Every field is
/// optional; absence is tolerated, excess is truncated.
#[derive(Debug, Default, Deserialize)]
struct WireNarrative {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

impl Narrative {
    /// Parse and validate a collaborator completion against the context it
    /// was generated from. Items citing numbers not traceable to the
    /// context are dropped, never corrected.
    pub fn from_completion(
        completion: &str,
        context: &NarrativeContext,
        config: &ReportConfig,
    ) -> NarrativeResult<Self> {
        let wire: WireNarrative =
            serde_json::from_str(completion.trim()).map_err(|e| NarrativeError::InvalidResponse {
                message: format!("narrative is not valid JSON: {}", e),
            })?;
        Ok(Self::validated(wire, context, config))
    }

    fn validated(wire: WireNarrative, context: &NarrativeContext, config: &ReportConfig) -> Self {
        let facts = context.numeric_facts();

        let accept = |items: Vec<String>| -> Vec<String> {
            let mut kept = Vec::new();
            for item in items {
                let item = truncate_chars(item.trim(), config.max_item_chars);
                if item.is_empty() {
                    continue;
                }
                if !numbers_traceable(&item, &facts) {
                    debug!(item = %item, "Dropping narrative item with untraceable numbers");
                    continue;
                }
                kept.push(item);
                if kept.len() == config.max_narrative_items {
                    break;
                }
            }
            kept
        };

        let summary = truncate_chars(wire.summary.trim(), config.max_item_chars);
        let summary = if summary.is_empty() || !numbers_traceable(&summary, &facts) {
            // An unverifiable summary is replaced by the deterministic one,
            // never repaired in place
            fallback_summary(context)
        } else {
            summary
        };

        Self {
            summary,
            highlights: accept(wire.highlights),
            issues: accept(wire.issues),
            recommendations: accept(wire.recommendations),
            ai_generated: true,
        }
    }

    /// Deterministic narrative generated from the context facts, used when
    /// the collaborator is unavailable or times out.
    pub fn fallback(context: &NarrativeContext) -> Self {
        let mut highlights = Vec::new();
        for key in ["total_impressions", "total_clicks", "total_conversions", "total_revenue"] {
            if let Some(value) = context.metrics.get(key) {
                highlights.push(format!(
                    "{} reached {}",
                    humanize(key),
                    format_metric(*value)
                ));
            }
        }
        if let Some((key, change)) = best_change(context) {
            highlights.push(format!(
                "{} grew {}% period over period",
                humanize(metric_base_name(&key)),
                format_metric(change)
            ));
        }
        highlights.truncate(5);

        let mut issues = Vec::new();
        for anomaly in context.anomalies.iter().take(3) {
            issues.push(format!(
                "{} deviation in {} on {}: observed {} against expected {} to {}",
                anomaly.severity,
                anomaly.metric,
                anomaly.period,
                format_metric(anomaly.observed),
                format_metric(anomaly.expected_low),
                format_metric(anomaly.expected_high),
            ));
        }
        for (key, change) in declining_changes(context).into_iter().take(3) {
            if issues.len() >= 3 {
                break;
            }
            issues.push(format!(
                "{} declined {}% period over period",
                humanize(metric_base_name(&key)),
                format_metric(change.abs())
            ));
        }

        let mut recommendations = Vec::new();
        if let Some(anomaly) = context.anomalies.first() {
            recommendations.push(format!(
                "Investigate the {} deviation on {} before the next reporting cycle",
                anomaly.metric, anomaly.period
            ));
        }
        if let Some((key, change)) = declining_changes(context).into_iter().next() {
            recommendations.push(format!(
                "Review targeting for {}, down {}% period over period",
                metric_base_name(&key),
                format_metric(change.abs())
            ));
        }
        if let Some((key, _)) = best_change(context) {
            recommendations.push(format!(
                "Shift budget toward the segments sustaining {} growth",
                metric_base_name(&key)
            ));
        }
        if recommendations.is_empty() {
            if let Some(key) = context.metrics.keys().next() {
                recommendations.push(format!(
                    "Set up automated alerts for significant {} deviations",
                    metric_base_name(key)
                ));
            }
        }
        recommendations.truncate(3);

        Self {
            summary: format!("{} {}", FALLBACK_SUMMARY_NOTE, fallback_summary(context)),
            highlights,
            issues,
            recommendations,
            ai_generated: false,
        }
    }
}

/// Rule-based executive summary built from the context facts.
fn fallback_summary(context: &NarrativeContext) -> String {
    let mut summary = match context.date_range {
        Some((start, end)) => format!(
            "This report analyzes {} data records spanning {} to {}.",
            context.rows, start, end
        ),
        None => format!("This report analyzes {} data records.", context.rows),
    };
    if let Some(ctr) = context.metrics.get("overall_ctr") {
        summary.push_str(&format!(
            " The overall click-through rate is {}%.",
            format_metric(*ctr)
        ));
    }
    if let Some(revenue) = context.metrics.get("total_revenue") {
        summary.push_str(&format!(
            " Total revenue generated is {}.",
            format_metric(*revenue)
        ));
    }
    if let Some(roas) = context.metrics.get("overall_roas") {
        summary.push_str(&format!(
            " Return on ad spend stands at {}x.",
            format_metric(*roas)
        ));
    }
    summary
}

fn best_change(context: &NarrativeContext) -> Option<(String, f64)> {
    context
        .metrics
        .iter()
        .filter(|(name, _)| name.ends_with("_period_change_pct"))
        .filter(|(_, change)| **change > 0.0)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, change)| (name.clone(), *change))
}

fn declining_changes(context: &NarrativeContext) -> Vec<(String, f64)> {
    let mut declining: Vec<(String, f64)> = context
        .metrics
        .iter()
        .filter(|(name, _)| name.ends_with("_period_change_pct"))
        .filter(|(_, change)| **change < -10.0)
        .map(|(name, change)| (name.clone(), *change))
        .collect();
    declining.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    declining
}

/// Format a fact value the way the fallback narrative cites it: integers
/// bare, everything else at two decimal places.
fn format_metric(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.2}", value)
    }
}

fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for word in name.split('_') {
        if word.is_empty() {
            continue;
        }
        let mut chars = word.chars();
        let first = chars.next().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        words.push(format!("{}{}", first, chars.as_str()));
    }
    words.join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Extract every numeric literal in a text item. Thousands separators and
/// leading currency signs are tolerated; trailing punctuation is not part
/// of the number.
fn extract_numbers(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut token = String::new();
    let mut prev_was_digitish = false;

    for ch in text.chars() {
        let part_of_number = ch.is_ascii_digit()
            || (prev_was_digitish && (ch == '.' || ch == ','))
            || (!prev_was_digitish && ch == '-' && token.is_empty());
        if part_of_number && (ch.is_ascii_digit() || !token.is_empty() || ch == '-') {
            token.push(ch);
            prev_was_digitish = ch.is_ascii_digit() || ch == '.' || ch == ',';
        } else {
            flush_token(&mut token, &mut numbers);
            prev_was_digitish = false;
        }
    }
    flush_token(&mut token, &mut numbers);
    numbers
}

fn flush_token(token: &mut String, numbers: &mut Vec<f64>) {
    if token.is_empty() {
        return;
    }
    let cleaned: String = token
        .trim_end_matches(['.', ','])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(n) = cleaned.parse::<f64>() {
            numbers.push(n);
        }
    }
    token.clear();
}

/// Whether every number in the text matches a context fact, allowing for
/// rounding to two, one, or zero decimal places.
fn numbers_traceable(text: &str, facts: &[f64]) -> bool {
    extract_numbers(text)
        .into_iter()
        .all(|n| facts.iter().any(|fact| matches_fact(n, *fact)))
}

fn matches_fact(cited: f64, fact: f64) -> bool {
    let tolerance = 0.005 + 1e-9;
    (cited - fact).abs() <= tolerance
        || (cited - (fact * 10.0).round() / 10.0).abs() <= 1e-9
        || (cited - fact.round()).abs() <= 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    use crate::kpi::Severity;

    fn context() -> NarrativeContext {
        let mut metrics = BTreeMap::new();
        metrics.insert("overall_ctr".to_string(), 3.6667);
        metrics.insert("total_clicks".to_string(), 360.0);
        metrics.insert("total_impressions".to_string(), 3000.0);
        metrics.insert("clicks_period_change_pct".to_string(), 42.5);
        metrics.insert("spend_period_change_pct".to_string(), -25.0);
        NarrativeContext {
            title: "Q1 Report".to_string(),
            rows: 3,
            date_range: Some((
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            )),
            metrics,
            anomalies: vec![AnomalyFact {
                metric: "ctr".to_string(),
                period: NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
                observed: 30.0,
                expected_low: 3.0,
                expected_high: 3.0,
                severity: Severity::Severe,
            }],
            correlations: vec![],
        }
    }

    #[test]
    fn test_extract_numbers() {
        assert_eq!(extract_numbers("CTR rose to 3.67% on 1,000 views"), vec![3.67, 1000.0]);
        assert_eq!(extract_numbers("no numbers here"), Vec::<f64>::new());
        assert_eq!(extract_numbers("spend fell -25.0%"), vec![-25.0]);
        assert_eq!(extract_numbers("revenue was $1,250.50."), vec![1250.5]);
    }

    #[test]
    fn test_valid_completion_is_accepted() {
        let completion = r#"{
            "summary": "Across 3 records the overall click-through rate was 3.67%.",
            "highlights": ["Total clicks reached 360", "Clicks grew 42.5% period over period"],
            "issues": ["ctr spiked to 30 on 2024-03-03"],
            "recommendations": ["Investigate the ctr spike of 30"]
        }"#;
        let narrative =
            Narrative::from_completion(completion, &context(), &ReportConfig::default()).unwrap();

        assert!(narrative.ai_generated);
        assert_eq!(narrative.highlights.len(), 2);
        assert_eq!(narrative.issues.len(), 1);
        assert_eq!(narrative.recommendations.len(), 1);
        assert!(narrative.summary.contains("3.67"));
    }

    #[test]
    fn test_untraceable_items_are_dropped() {
        let completion = r#"{
            "summary": "Total clicks reached 360.",
            "highlights": ["Total clicks reached 360", "Revenue hit $99,999"],
            "issues": [],
            "recommendations": ["Double the budget to 50000"]
        }"#;
        let narrative =
            Narrative::from_completion(completion, &context(), &ReportConfig::default()).unwrap();

        assert_eq!(narrative.highlights, vec!["Total clicks reached 360"]);
        assert!(narrative.recommendations.is_empty());
    }

    #[test]
    fn test_untraceable_summary_falls_back() {
        let completion = r#"{"summary": "Revenue hit $99,999.", "highlights": [], "issues": [], "recommendations": []}"#;
        let narrative =
            Narrative::from_completion(completion, &context(), &ReportConfig::default()).unwrap();

        assert!(narrative.summary.starts_with("This report analyzes 3 data records"));
    }

    #[test]
    fn test_malformed_completion_is_invalid_response() {
        let err = Narrative::from_completion("not json", &context(), &ReportConfig::default())
            .unwrap_err();
        assert!(matches!(err, NarrativeError::InvalidResponse { .. }));
    }

    #[test]
    fn test_item_and_length_bounds() {
        let many: Vec<String> = (0..20).map(|_| "Total clicks reached 360".to_string()).collect();
        let completion = serde_json::json!({
            "summary": "x".repeat(5000),
            "highlights": many,
            "issues": [],
            "recommendations": []
        })
        .to_string();
        let config = ReportConfig::default();
        let narrative = Narrative::from_completion(&completion, &context(), &config).unwrap();

        assert_eq!(narrative.highlights.len(), config.max_narrative_items);
        assert_eq!(narrative.summary.chars().count(), config.max_item_chars);
    }

    #[test]
    fn test_fallback_carries_placeholder_and_facts() {
        let narrative = Narrative::fallback(&context());

        assert!(!narrative.ai_generated);
        assert!(narrative.summary.starts_with(FALLBACK_SUMMARY_NOTE));
        assert!(narrative.summary.contains("3 data records"));
        assert!(!narrative.highlights.is_empty());
        assert!(narrative.issues.iter().any(|i| i.contains("ctr")));
        // Every fallback recommendation names a metric or anomaly
        assert!(narrative
            .recommendations
            .iter()
            .any(|r| r.contains("ctr")));
    }
}
