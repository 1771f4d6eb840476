use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub narrative: NarrativeConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub analysis: AnalysisConfig,
    pub report: ReportConfig,
}

/// Narrative collaborator (chat-completions API) configuration
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    /// API key. When absent the pipeline skips the collaborator and uses
    /// the deterministic fallback narrative.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// KPI engine thresholds.
///
/// The anomaly threshold and highlight count were implicit constants in
/// earlier revisions; they are configuration with documented defaults.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Deviation score (in standard deviations) above which a period value
    /// is flagged anomalous. Default 2.0.
    pub anomaly_threshold: f64,
    /// Severe anomalies score beyond `anomaly_threshold * severe_multiplier`.
    /// Default 1.5, so the default bands are 2-3 moderate, >3 severe.
    pub severe_multiplier: f64,
    /// Minimum per-period points before a series is scored. Default 3.
    pub min_series_points: usize,
    /// Minimum shared non-missing points before a correlation is reported.
    /// Default 3.
    pub min_correlation_points: usize,
    /// Correlations with |r| at or below this are not reported. Default 0.5.
    pub correlation_cutoff: f64,
    /// |r| above this is labelled "strong". Default 0.7.
    pub strong_correlation_cutoff: f64,
    /// Cap on reported correlation pairs. Default 10.
    pub max_correlation_pairs: usize,
    /// Number of metrics surfaced in the highlights section. Default 5.
    pub top_highlights: usize,
}

/// Report and narrative bounds configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub default_title: String,
    /// Directory rendered reports are written to.
    pub output_dir: PathBuf,
    /// Cap on items accepted per narrative list field.
    pub max_narrative_items: usize,
    /// Cap on characters accepted per narrative text item.
    pub max_item_chars: usize,
    /// Cap on metric entries serialized into the narrative context.
    pub max_context_metrics: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let narrative = NarrativeConfig {
            api_key: env::var("NARRATIVE_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: env::var("NARRATIVE_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("NARRATIVE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            max_tokens: env::var("NARRATIVE_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1500),
            temperature: env::var("NARRATIVE_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.7),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/reports.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let defaults = AnalysisConfig::default();
        let analysis = AnalysisConfig {
            anomaly_threshold: env::var("ANOMALY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.anomaly_threshold),
            top_highlights: env::var("TOP_HIGHLIGHTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.top_highlights),
            ..defaults
        };

        let report = ReportConfig {
            default_title: env::var("REPORT_TITLE")
                .unwrap_or_else(|_| "Performance Report".to_string()),
            output_dir: PathBuf::from(
                env::var("REPORTS_DIR").unwrap_or_else(|_| "./reports".to_string()),
            ),
            ..ReportConfig::default()
        };

        Ok(Config {
            narrative,
            database,
            logging,
            request,
            analysis,
            report,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 2.0,
            severe_multiplier: 1.5,
            min_series_points: 3,
            min_correlation_points: 3,
            correlation_cutoff: 0.5,
            strong_correlation_cutoff: 0.7,
            max_correlation_pairs: 10,
            top_highlights: 5,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_title: "Performance Report".to_string(),
            output_dir: PathBuf::from("./reports"),
            max_narrative_items: 5,
            max_item_chars: 500,
            max_context_metrics: 40,
        }
    }
}
