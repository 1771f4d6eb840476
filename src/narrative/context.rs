//! Fact-bounded context for the narrative collaborator.
//!
//! The context is the only thing the collaborator ever sees. Every number
//! in it is lifted verbatim from the KpiSet or the anomaly/correlation
//! lists, so any narrative claim can be traced back to a computed fact.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::config::ReportConfig;
use crate::kpi::{Analysis, Severity};

/// A flagged deviation, reduced to the fields the collaborator needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFact {
    pub metric: String,
    pub period: NaiveDate,
    pub observed: f64,
    pub expected_low: f64,
    pub expected_high: f64,
    pub severity: Severity,
}

/// A reported correlation, reduced for the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationFact {
    pub metric_a: String,
    pub metric_b: String,
    pub coefficient: f64,
}

/// Read-only snapshot of the analysis, serialized for the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeContext {
    pub title: String,
    pub rows: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Available overall metrics only; unavailable metrics are omitted.
    pub metrics: BTreeMap<String, f64>,
    pub anomalies: Vec<AnomalyFact>,
    pub correlations: Vec<CorrelationFact>,
}

impl NarrativeContext {
    /// Build the context from an analysis. Metric entries are capped at
    /// `config.max_context_metrics` to bound the payload size.
    pub fn from_analysis(title: impl Into<String>, analysis: &Analysis, config: &ReportConfig) -> Self {
        let metrics: BTreeMap<String, f64> = analysis
            .kpis
            .available_metrics()
            .take(config.max_context_metrics)
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        let anomalies = analysis
            .anomalies
            .iter()
            .map(|a| AnomalyFact {
                metric: a.metric.clone(),
                period: a.period,
                observed: a.observed,
                expected_low: a.expected_low,
                expected_high: a.expected_high,
                severity: a.severity,
            })
            .collect();

        let correlations = analysis
            .correlations
            .iter()
            .map(|c| CorrelationFact {
                metric_a: c.metric_a.clone(),
                metric_b: c.metric_b.clone(),
                coefficient: c.coefficient,
            })
            .collect();

        Self {
            title: title.into(),
            rows: analysis.kpis.summary.rows,
            date_range: analysis.kpis.summary.date_range,
            metrics,
            anomalies,
            correlations,
        }
    }

    /// JSON payload sent to the collaborator.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Every numeric fact a narrative is allowed to cite: metric values,
    /// anomaly observations and bounds, correlation coefficients, the row
    /// count, and the components of any date it may mention.
    pub fn numeric_facts(&self) -> Vec<f64> {
        let mut facts: Vec<f64> = Vec::new();
        facts.push(self.rows as f64);
        facts.extend(self.metrics.values().copied());
        for anomaly in &self.anomalies {
            facts.push(anomaly.observed);
            facts.push(anomaly.expected_low);
            facts.push(anomaly.expected_high);
            push_date_parts(&mut facts, anomaly.period);
        }
        for correlation in &self.correlations {
            facts.push(correlation.coefficient);
        }
        if let Some((start, end)) = self.date_range {
            push_date_parts(&mut facts, start);
            push_date_parts(&mut facts, end);
        }
        facts
    }
}

fn push_date_parts(facts: &mut Vec<f64>, date: NaiveDate) {
    facts.push(date.year() as f64);
    facts.push(date.month() as f64);
    facts.push(date.day() as f64);
}
