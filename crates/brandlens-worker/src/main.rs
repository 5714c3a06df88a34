//! Command-line brand exposure analysis.

use std::sync::Arc;

use anyhow::{Context, Result};
use brandlens_detector::HttpDetector;
use brandlens_worker::{AnalysisRequest, BrandAnalyzer, WorkerConfig};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "brandlens-worker")]
#[command(about = "Measure brand exposure in a video or image")]
#[command(version)]
struct Args {
    /// Local file path or http(s) URL (HLS manifests are resolved)
    source: String,

    /// Analyse a single still image
    #[arg(long)]
    image: bool,

    /// Render detection overlays into output.mp4
    #[arg(long)]
    overlay: bool,

    /// Directory for run artifacts
    #[arg(long, env = "WORKER_RESULTS_DIR")]
    results_dir: Option<std::path::PathBuf>,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("brandlens=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let mut config = WorkerConfig::from_env();
    config.render_overlay |= args.overlay;
    if let Some(dir) = args.results_dir {
        config.results_dir = dir;
    }
    info!("Worker config: {:?}", config);

    let detector = HttpDetector::from_env().context("Failed to create detector client")?;
    if !detector.health_check().await.unwrap_or(false) {
        warn!("Detector service is not healthy; continuing anyway");
    }

    let analyzer = BrandAnalyzer::new(config, Arc::new(detector))
        .context("Failed to create analyzer")?;
    let request = if args.image {
        AnalysisRequest::image(args.source)
    } else {
        AnalysisRequest::video(args.source)
    };

    let report = analyzer
        .analyze(&request)
        .await
        .context("Analysis failed")?;

    info!(
        job_id = %report.handle.job_id,
        dir = %report.layout.dir().display(),
        "Summary written to {}",
        report.layout.summary_json().display()
    );
    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    Ok(())
}
