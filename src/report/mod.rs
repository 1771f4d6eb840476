//! Report assembler: turns a computed analysis, a validated narrative, and
//! chart references into an ordered, renderer-agnostic document model.
//!
//! The section ordering is a contract renderers rely on; see
//! [`SectionKind::ORDER`]. A [`ReportDocument`] is immutable once built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::charts::ChartRef;
use crate::config::AnalysisConfig;
use crate::error::ReportError;
use crate::kpi::{metric_base_name, Analysis, Anomaly, MetricValue};
use crate::narrative::Narrative;

/// Metrics where a decrease is the favorable direction.
const COST_METRICS: &[&str] = &["cpc", "cpm", "cpa", "spend"];

/// Report section kinds, in their fixed document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Cover,
    ExecutiveSummary,
    KpiDashboard,
    Charts,
    Highlights,
    Issues,
    Recommendations,
}

impl SectionKind {
    /// The fixed section ordering every document follows.
    pub const ORDER: [SectionKind; 7] = [
        SectionKind::Cover,
        SectionKind::ExecutiveSummary,
        SectionKind::KpiDashboard,
        SectionKind::Charts,
        SectionKind::Highlights,
        SectionKind::Issues,
        SectionKind::Recommendations,
    ];

    /// Display title for the section.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Cover => "Cover",
            SectionKind::ExecutiveSummary => "Executive Summary",
            SectionKind::KpiDashboard => "KPI Dashboard",
            SectionKind::Charts => "Charts",
            SectionKind::Highlights => "Highlights",
            SectionKind::Issues => "Issues",
            SectionKind::Recommendations => "Recommendations",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SectionKind::Cover => "cover",
            SectionKind::ExecutiveSummary => "executive-summary",
            SectionKind::KpiDashboard => "kpi-dashboard",
            SectionKind::Charts => "charts",
            SectionKind::Highlights => "highlights",
            SectionKind::Issues => "issues",
            SectionKind::Recommendations => "recommendations",
        };
        write!(f, "{}", name)
    }
}

/// A typed content block within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Text(String),
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Image(ChartRef),
}

/// One report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub blocks: Vec<Block>,
}

/// The assembled document. Immutable once built: consumers read sections,
/// they never mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    title: String,
    generated_at: DateTime<Utc>,
    sections: Vec<Section>,
}

impl ReportDocument {
    /// Report title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Generation timestamp.
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Sections in the fixed document order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section lookup by kind.
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

/// Assembles report documents from analysis output.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    config: AnalysisConfig,
}

impl ReportAssembler {
    /// Create an assembler with the given thresholds.
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Build the document. Fails with [`ReportError::IncompleteReport`]
    /// when the analysis has no computable metric at all: a report is
    /// never emitted with zero KPI content.
    pub fn assemble(
        &self,
        title: &str,
        analysis: &Analysis,
        narrative: &Narrative,
        charts: &[ChartRef],
    ) -> Result<ReportDocument, ReportError> {
        if analysis.kpis.computable_count() == 0 {
            return Err(ReportError::IncompleteReport {
                message: "no computable metrics".to_string(),
            });
        }

        let sections = SectionKind::ORDER
            .iter()
            .map(|kind| Section {
                kind: *kind,
                title: kind.title().to_string(),
                blocks: match kind {
                    SectionKind::Cover => self.cover_blocks(title, analysis),
                    SectionKind::ExecutiveSummary => vec![Block::Text(narrative.summary.clone())],
                    SectionKind::KpiDashboard => self.dashboard_blocks(analysis),
                    SectionKind::Charts => {
                        charts.iter().cloned().map(Block::Image).collect()
                    }
                    SectionKind::Highlights => self.highlight_blocks(analysis, narrative),
                    SectionKind::Issues => self.issue_blocks(analysis, narrative),
                    SectionKind::Recommendations => {
                        self.recommendation_blocks(analysis, narrative)
                    }
                },
            })
            .collect();

        info!(title = %title, charts = charts.len(), "Assembled report document");

        Ok(ReportDocument {
            title: title.to_string(),
            generated_at: Utc::now(),
            sections,
        })
    }

    fn cover_blocks(&self, title: &str, analysis: &Analysis) -> Vec<Block> {
        let summary = &analysis.kpis.summary;
        let mut blocks = vec![Block::Text(title.to_string())];
        if let Some((start, end)) = summary.date_range {
            blocks.push(Block::Text(format!("Reporting period: {} to {}", start, end)));
        }
        blocks.push(Block::Text(format!(
            "{} records across {} columns",
            summary.rows, summary.columns
        )));
        blocks
    }

    fn dashboard_blocks(&self, analysis: &Analysis) -> Vec<Block> {
        let rows = analysis
            .kpis
            .overall
            .iter()
            .map(|(name, value)| {
                let rendered = match value {
                    MetricValue::Available(v) => format_value(*v),
                    MetricValue::Unavailable => "unavailable".to_string(),
                };
                vec![name.clone(), rendered]
            })
            .collect();
        vec![Block::Table {
            headers: vec!["Metric".to_string(), "Value".to_string()],
            rows,
        }]
    }

    /// Top-K metrics by favorable period-over-period change; for cost
    /// metrics a decrease is the favorable direction.
    fn highlight_blocks(&self, analysis: &Analysis, narrative: &Narrative) -> Vec<Block> {
        let mut changes: Vec<(String, f64, f64)> = analysis
            .kpis
            .overall
            .iter()
            .filter(|(name, _)| name.ends_with("_period_change_pct"))
            .filter_map(|(name, value)| value.value().map(|v| (name.clone(), v)))
            .map(|(name, change)| {
                let base = metric_base_name(&name).to_string();
                let favorability = if COST_METRICS.contains(&base.as_str()) {
                    -change
                } else {
                    change
                };
                (base, change, favorability)
            })
            .filter(|(_, _, favorability)| *favorability > 0.0)
            .collect();

        changes.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        changes.truncate(self.config.top_highlights);

        let mut blocks = Vec::new();
        if !changes.is_empty() {
            blocks.push(Block::Table {
                headers: vec![
                    "Metric".to_string(),
                    "Period-over-period change".to_string(),
                ],
                rows: changes
                    .into_iter()
                    .map(|(base, change, _)| {
                        let direction = if change >= 0.0 { "up" } else { "down" };
                        vec![base, format!("{} {:.1}%", direction, change.abs())]
                    })
                    .collect(),
            });
        }
        blocks.extend(narrative.highlights.iter().cloned().map(Block::Text));
        blocks
    }

    /// All anomalies at or above moderate severity, most severe first,
    /// then chronological.
    fn issue_blocks(&self, analysis: &Analysis, narrative: &Narrative) -> Vec<Block> {
        let mut anomalies: Vec<&Anomaly> = analysis.anomalies.iter().collect();
        anomalies.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.period.cmp(&b.period))
                .then_with(|| a.metric.cmp(&b.metric))
        });

        let mut blocks = Vec::new();
        if !anomalies.is_empty() {
            blocks.push(Block::Table {
                headers: vec![
                    "Metric".to_string(),
                    "Period".to_string(),
                    "Observed".to_string(),
                    "Expected range".to_string(),
                    "Severity".to_string(),
                ],
                rows: anomalies
                    .into_iter()
                    .map(|a| {
                        vec![
                            a.metric.clone(),
                            a.period.to_string(),
                            format_value(a.observed),
                            format!(
                                "{} to {}",
                                format_value(a.expected_low),
                                format_value(a.expected_high)
                            ),
                            a.severity.to_string(),
                        ]
                    })
                    .collect(),
            });
        }
        blocks.extend(narrative.issues.iter().cloned().map(Block::Text));
        blocks
    }

    /// Narrative recommendations, kept only when they reference at least
    /// one KpiSet key or anomalous metric. Nothing is ever fabricated in
    /// their place.
    fn recommendation_blocks(&self, analysis: &Analysis, narrative: &Narrative) -> Vec<Block> {
        narrative
            .recommendations
            .iter()
            .filter(|text| {
                let kept = references_known_metric(text, analysis);
                if !kept {
                    debug!(recommendation = %text, "Dropping unreferenced recommendation");
                }
                kept
            })
            .cloned()
            .map(Block::Text)
            .collect()
    }
}

/// Whether a recommendation mentions a KpiSet key or anomalous metric,
/// matching the key's base name with underscores or spaces.
fn references_known_metric(text: &str, analysis: &Analysis) -> bool {
    let lower = text.to_lowercase();
    let mentions = |name: &str| -> bool {
        lower.contains(name) || lower.contains(&name.replace('_', " "))
    };
    analysis
        .kpis
        .overall
        .keys()
        .any(|key| mentions(metric_base_name(key)))
        || analysis.anomalies.iter().any(|a| mentions(&a.metric))
}

fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.2}", value)
    }
}
