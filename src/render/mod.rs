//! Renderer collaborator contract plus the built-in plain-text renderer.
//!
//! PDF and slide writers are external collaborators: they consume a
//! [`ReportDocument`] in its fixed section order and produce a byte
//! stream. The crate ships only [`TextRenderer`], used by the CLI and
//! tests; render failures are fatal and no partial output is ever exposed.

use serde::{Deserialize, Serialize};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::error::{RenderError, RenderResult};
use crate::report::{Block, ReportDocument};

/// Output format for a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Pptx,
    Text,
}

impl ReportFormat {
    /// File extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Pptx => "pptx",
            ReportFormat::Text => "txt",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Pdf => write!(f, "pdf"),
            ReportFormat::Pptx => write!(f, "pptx"),
            ReportFormat::Text => write!(f, "text"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "pptx" => Ok(ReportFormat::Pptx),
            "text" | "txt" => Ok(ReportFormat::Text),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

/// Renderer collaborator: consumes a document, produces bytes.
pub trait Renderer: Send + Sync {
    /// The format this renderer produces.
    fn format(&self) -> ReportFormat;

    /// Render the document to a byte stream.
    fn render(&self, document: &ReportDocument) -> RenderResult<Vec<u8>>;
}

/// Built-in plain-text renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Text
    }

    fn render(&self, document: &ReportDocument) -> RenderResult<Vec<u8>> {
        let mut out = String::new();
        out.push_str(&format!(
            "{}\nGenerated {}\n",
            document.title(),
            document.generated_at().format("%Y-%m-%d %H:%M UTC")
        ));

        for section in document.sections() {
            out.push_str(&format!("\n== {} ==\n", section.title));
            if section.blocks.is_empty() {
                out.push_str("(none)\n");
                continue;
            }
            for block in &section.blocks {
                match block {
                    Block::Text(text) => {
                        out.push_str(text);
                        out.push('\n');
                    }
                    Block::Table { headers, rows } => {
                        let mut builder = Builder::default();
                        builder.push_record(headers.clone());
                        for row in rows {
                            builder.push_record(row.clone());
                        }
                        let table = builder.build().with(Style::ascii()).to_string();
                        out.push_str(&table);
                        out.push('\n');
                    }
                    Block::Image(chart) => {
                        out.push_str(&format!(
                            "[chart: {} ({})] {}\n",
                            chart.name, chart.uri, chart.caption
                        ));
                    }
                }
            }
        }

        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::charts::ChartRef;
    use crate::config::AnalysisConfig;
    use crate::kpi::{Analysis, DatasetSummary, KpiSet, MetricValue};
    use crate::narrative::Narrative;
    use crate::report::ReportAssembler;

    fn document() -> ReportDocument {
        let analysis = Analysis {
            kpis: KpiSet {
                overall: BTreeMap::from([
                    ("total_clicks".to_string(), MetricValue::Available(90.0)),
                    ("overall_roas".to_string(), MetricValue::Unavailable),
                ]),
                periods: Vec::new(),
                summary: DatasetSummary {
                    rows: 3,
                    columns: 3,
                    numeric_columns: 2,
                    categorical_columns: 0,
                    date_columns: 1,
                    missing_cells: 0,
                    date_range: None,
                },
            },
            anomalies: Vec::new(),
            correlations: Vec::new(),
        };
        let narrative = Narrative {
            summary: "A quiet period with 90 clicks.".to_string(),
            highlights: Vec::new(),
            issues: Vec::new(),
            recommendations: Vec::new(),
            ai_generated: false,
        };
        let charts = vec![ChartRef {
            name: "daily_performance".to_string(),
            uri: "charts/daily.png".to_string(),
            caption: "Daily performance".to_string(),
        }];
        ReportAssembler::new(AnalysisConfig::default())
            .assemble("Q1 Report", &analysis, &narrative, &charts)
            .unwrap()
    }

    #[test]
    fn test_format_round_trip() {
        for (text, format) in [
            ("pdf", ReportFormat::Pdf),
            ("pptx", ReportFormat::Pptx),
            ("text", ReportFormat::Text),
            ("TXT", ReportFormat::Text),
        ] {
            assert_eq!(text.parse::<ReportFormat>().unwrap(), format);
        }
        assert!("docx".parse::<ReportFormat>().is_err());
        assert_eq!(ReportFormat::Pdf.extension(), "pdf");
    }

    #[test]
    fn test_text_renderer_covers_every_section() {
        let rendered = TextRenderer.render(&document()).unwrap();
        let text = String::from_utf8(rendered).unwrap();

        for title in [
            "Cover",
            "Executive Summary",
            "KPI Dashboard",
            "Charts",
            "Highlights",
            "Issues",
            "Recommendations",
        ] {
            assert!(text.contains(&format!("== {} ==", title)), "missing {}", title);
        }
        assert!(text.contains("total_clicks"));
        assert!(text.contains("unavailable"));
        assert!(text.contains("[chart: daily_performance"));
    }
}
