use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use insight_engine::{
    config::Config,
    narrative::NarrativeClient,
    pipeline::ReportPipeline,
    render::ReportFormat,
    storage::SqliteStorage,
};

/// Generate a KPI report from a directory of data files.
#[derive(Debug, Parser)]
#[command(name = "insight-engine", version, about)]
struct Cli {
    /// Directory containing the uploaded CSV/JSON files
    upload_dir: PathBuf,

    /// Output format (text, pdf, pptx; pdf/pptx need an external renderer)
    #[arg(short, long, default_value = "text")]
    format: ReportFormat,

    /// Report title
    #[arg(short, long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Insight Engine starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize narrative client
    let narrative = match NarrativeClient::new(&config.narrative, config.request.clone()) {
        Ok(c) => {
            if !c.has_credentials() {
                info!("No narrative API key configured; reports will use the fallback narrative");
            }
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize narrative client");
            return Err(e.into());
        }
    };

    let pipeline = Arc::new(ReportPipeline::new(config, storage, narrative));

    let upload_id = cli
        .upload_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let request = pipeline.accept(&upload_id, cli.format, cli.title).await?;
    let output = pipeline.generate(&request, &cli.upload_dir).await?;

    println!("Report written to {}", output.output_path.display());
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        insight_engine::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        insight_engine::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
