//! Report-generation pipeline: an explicit, ordered chain of typed stages
//! (`ingest -> transform -> analyze -> {narrate, chart} -> assemble ->
//! render`) plus a runner that executes one request per task.
//!
//! Stages within one request are strictly sequential; independent requests
//! run as separate tokio tasks and share nothing but the lifecycle store.
//! A failing stage marks the request failed with its message; the
//! narrative stage is the only one that degrades instead of failing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use crate::charts::{ChartProvider, ChartRef, NullChartProvider};
use crate::config::Config;
use crate::error::{AppError, AppResult, RenderError};
use crate::ingest::{self, IngestSummary};
use crate::kpi::{Analysis, KpiEngine};
use crate::narrative::{Narrative, NarrativeClient, NarrativeContext};
use crate::render::{Renderer, ReportFormat, TextRenderer};
use crate::report::{ReportAssembler, ReportDocument};
use crate::storage::{ReportRequest, RequestStatus, SqliteStorage, Storage};
use crate::transform::{self, TransformSummary};

/// Result of one completed generation request.
#[derive(Debug)]
pub struct ReportOutput {
    pub request: ReportRequest,
    pub document: ReportDocument,
    pub output_path: PathBuf,
}

/// The report-generation pipeline.
pub struct ReportPipeline {
    config: Config,
    storage: SqliteStorage,
    narrative_client: NarrativeClient,
    chart_provider: Arc<dyn ChartProvider>,
    renderers: Vec<Box<dyn Renderer>>,
    engine: KpiEngine,
    assembler: ReportAssembler,
}

impl ReportPipeline {
    /// Create a pipeline with the built-in text renderer and no charting
    /// collaborator.
    pub fn new(config: Config, storage: SqliteStorage, narrative_client: NarrativeClient) -> Self {
        let engine = KpiEngine::new(config.analysis.clone());
        let assembler = ReportAssembler::new(config.analysis.clone());
        Self {
            config,
            storage,
            narrative_client,
            chart_provider: Arc::new(NullChartProvider),
            renderers: vec![Box::new(TextRenderer)],
            engine,
            assembler,
        }
    }

    /// Wire in a charting collaborator.
    pub fn with_chart_provider(mut self, provider: Arc<dyn ChartProvider>) -> Self {
        self.chart_provider = provider;
        self
    }

    /// Register a renderer collaborator.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    /// Accept a request: persist it queued and return it.
    pub async fn accept(
        &self,
        upload_id: &str,
        format: ReportFormat,
        title: Option<String>,
    ) -> AppResult<ReportRequest> {
        let title = title.unwrap_or_else(|| self.config.report.default_title.clone());
        let request = ReportRequest::new(upload_id, format, title);
        self.storage.create_request(&request).await?;
        info!(request_id = %request.id, upload_id, %format, "Accepted report request");
        Ok(request)
    }

    /// Run one request to completion, updating its lifecycle record.
    pub async fn generate(
        &self,
        request: &ReportRequest,
        upload_dir: &Path,
    ) -> AppResult<ReportOutput> {
        self.storage
            .transition(&request.id, RequestStatus::Processing)
            .await?;

        match self.run_stages(request, upload_dir).await {
            Ok(output) => {
                self.storage
                    .mark_done(&request.id, &output.output_path.display().to_string())
                    .await?;
                info!(request_id = %request.id, path = %output.output_path.display(), "Report ready");
                Ok(output)
            }
            Err(e) => {
                error!(request_id = %request.id, error = %e, "Report generation failed");
                self.storage.mark_failed(&request.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Spawn a request as an independent task.
    pub fn spawn(
        self: Arc<Self>,
        request: ReportRequest,
        upload_dir: PathBuf,
    ) -> tokio::task::JoinHandle<AppResult<ReportOutput>> {
        tokio::spawn(async move { self.generate(&request, &upload_dir).await })
    }

    /// The sequential stage chain for one request.
    async fn run_stages(
        &self,
        request: &ReportRequest,
        upload_dir: &Path,
    ) -> AppResult<ReportOutput> {
        let ingested: IngestSummary =
            self.stage(request, "ingest", || Ok(ingest::ingest_dir(upload_dir)?))?;

        let transformed: TransformSummary = self.stage(request, "transform", || {
            Ok(transform::transform(ingested.dataset.clone()))
        })?;

        let analysis: Analysis = self.stage(request, "analyze", || {
            Ok(self.engine.compute(&transformed.dataset)?)
        })?;

        let narrative = self.narrate(&request.title, &analysis).await;
        let charts = self.chart(&analysis).await;

        let document: ReportDocument = self.stage(request, "assemble", || {
            Ok(self
                .assembler
                .assemble(&request.title, &analysis, &narrative, &charts)?)
        })?;

        let output_path = self.render_to_file(request, &document)?;

        Ok(ReportOutput {
            request: request.clone(),
            document,
            output_path,
        })
    }

    /// Run one synchronous stage with latency logging and attribution.
    fn stage<T>(
        &self,
        request: &ReportRequest,
        name: &'static str,
        run: impl FnOnce() -> AppResult<T>,
    ) -> AppResult<T> {
        let start = Instant::now();
        match run() {
            Ok(value) => {
                info!(
                    request_id = %request.id,
                    stage = name,
                    latency_ms = start.elapsed().as_millis(),
                    "Stage complete"
                );
                Ok(value)
            }
            Err(e) => {
                error!(
                    request_id = %request.id,
                    stage = name,
                    error = %e,
                    "Stage failed"
                );
                Err(e)
            }
        }
    }

    /// Narrative stage. Never fails the request: on timeout or any
    /// collaborator error the deterministic fallback narrative is used.
    async fn narrate(&self, title: &str, analysis: &Analysis) -> Narrative {
        let context = NarrativeContext::from_analysis(title, analysis, &self.config.report);

        if !self.narrative_client.has_credentials() {
            info!("No narrative credentials; using fallback narrative");
            return Narrative::fallback(&context);
        }

        // Hard stop covering every retry the client may attempt
        let budget = Duration::from_millis(
            self.config.request.timeout_ms * (self.config.request.max_retries as u64 + 2),
        );

        match timeout(budget, self.narrative_client.request_narrative(&context)).await {
            Err(_) => {
                warn!("Narrative request exceeded its budget; using fallback");
                Narrative::fallback(&context)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Narrative collaborator failed; using fallback");
                Narrative::fallback(&context)
            }
            Ok(Ok(completion)) => {
                match Narrative::from_completion(&completion, &context, &self.config.report) {
                    Ok(narrative) => narrative,
                    Err(e) => {
                        warn!(error = %e, "Narrative response rejected; using fallback");
                        Narrative::fallback(&context)
                    }
                }
            }
        }
    }

    /// Chart stage. A collaborator failure degrades to an empty chart set.
    async fn chart(&self, analysis: &Analysis) -> Vec<ChartRef> {
        match self.chart_provider.render(&analysis.kpis).await {
            Ok(charts) => charts,
            Err(e) => {
                warn!(error = %e, "Chart collaborator failed; continuing without charts");
                Vec::new()
            }
        }
    }

    /// Render stage. Fatal on failure; the output file is written only
    /// after the full byte stream exists, so no partial file is exposed.
    fn render_to_file(
        &self,
        request: &ReportRequest,
        document: &ReportDocument,
    ) -> AppResult<PathBuf> {
        let renderer = self
            .renderers
            .iter()
            .find(|r| r.format() == request.format)
            .ok_or_else(|| RenderError::NoRenderer {
                format: request.format.to_string(),
            })?;

        let bytes = renderer.render(document)?;

        let dir = &self.config.report.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Render(RenderError::Failed {
                format: request.format.to_string(),
                message: format!("cannot create output directory: {}", e),
            })
        })?;

        let path = dir.join(format!(
            "{}_{}.{}",
            sanitize_filename(&request.title),
            request.id.get(..8).unwrap_or(&request.id),
            request.format.extension()
        ));
        std::fs::write(&path, bytes).map_err(|e| {
            AppError::Render(RenderError::Failed {
                format: request.format.to_string(),
                message: format!("cannot write output file: {}", e),
            })
        })?;

        Ok(path)
    }
}

fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
