// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! multicam-infer — multi-camera ingestion, detector pipeline, event publishing.
//!
//! Usage:
//!   infer --config config.toml [--http 0.0.0.0:8080]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use multicam_infer::api;
use multicam_infer::config::Config;
use multicam_infer::detector::ModelRegistry;
use multicam_infer::manager::ProcessManager;

#[derive(Parser)]
#[command(name = "infer", about = "Multi-camera inference service", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Address the HTTP API (healthz + metrics) binds to. Overrides
    /// `[api].port` from the config file when given.
    #[arg(long)]
    http: Option<String>,
}

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(cameras = cfg.cameras.len(), "starting multicam-infer");

    let prometheus_handle = match metrics_exporter_prometheus::PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("infer_latency_ms".to_string()),
            multicam_infer::metrics::LATENCY_BUCKETS,
        )
        .and_then(|b| b.install_recorder())
    {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to install metrics recorder");
            std::process::exit(1);
        }
    };

    let aws_config = aws_config::load_from_env().await;

    // Concrete model/OCR backends are injected by the embedder; this
    // service never ships one itself, so the registry starts empty and any
    // camera referencing an unregistered model_ref fails ProcessManager::new.
    let registry = ModelRegistry::new();

    let video_base_url = std::env::var("VIDEO_SERVICE_BASE_URL").unwrap_or_else(|_| {
        error!("VIDEO_SERVICE_BASE_URL not set, defaulting to http://localhost:9000");
        "http://localhost:9000".to_string()
    });

    let manager = match ProcessManager::new(cfg.clone(), registry, video_base_url, &aws_config) {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to start process manager");
            std::process::exit(1);
        }
    };

    if cfg.api.enabled {
        let http_addr = cli.http.clone().unwrap_or_else(|| format!("0.0.0.0:{}", cfg.api.port));
        let state = std::sync::Arc::new(api::AppState { prometheus_handle });
        tokio::spawn(async move {
            api::start_server(state, &http_addr).await;
        });
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c, shutting down"),
        Err(e) => error!(error = %e, "signal error"),
    }

    manager.shutdown(WORKER_JOIN_TIMEOUT, FLUSH_DEADLINE).await;
}
