//! # Insight Engine
//!
//! A batch report-generation pipeline: it ingests tabular data files,
//! computes marketing KPIs, detects per-period anomalies, requests a
//! fact-bounded narrative from a language-model collaborator, and
//! assembles everything into an ordered document model ready for a
//! renderer.
//!
//! ## Pipeline
//!
//! ```text
//! ingest -> transform -> analyze -> {narrate, chart} -> assemble -> render
//!                                        |
//!                              SQLite (request lifecycle)
//! ```
//!
//! Data flows strictly forward; no stage calls backward. The narrative
//! stage is the only one with external latency and the only one that
//! degrades (to a deterministic fallback) instead of failing the request.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use insight_engine::{Config, ReportPipeline, ReportFormat};
//! use insight_engine::narrative::NarrativeClient;
//! use insight_engine::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let client = NarrativeClient::new(&config.narrative, config.request.clone())?;
//!     let pipeline = Arc::new(ReportPipeline::new(config, storage, client));
//!     let request = pipeline.accept("upload-1", ReportFormat::Text, None).await?;
//!     pipeline.generate(&request, "data/upload-1".as_ref()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Charting collaborator contract and chart reference types.
pub mod charts;
/// Configuration management.
pub mod config;
/// Tabular data model shared by the pipeline stages.
pub mod dataset;
/// Error types and result aliases for the application.
pub mod error;
/// Source-file ingestion and schema merging.
pub mod ingest;
/// KPI computation, anomaly detection, and correlation analysis.
pub mod kpi;
/// Narrative collaborator client, context, and validation.
pub mod narrative;
/// The staged report-generation pipeline and its runner.
pub mod pipeline;
/// System prompt for the narrative collaborator.
pub mod prompts;
/// Renderer collaborator contract and the built-in text renderer.
pub mod render;
/// Report document model and assembler.
pub mod report;
/// SQLite-backed request lifecycle storage.
pub mod storage;
/// Date parsing, missing-value handling, and derived metrics.
pub mod transform;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{ReportOutput, ReportPipeline};
pub use render::ReportFormat;
pub use report::ReportDocument;
