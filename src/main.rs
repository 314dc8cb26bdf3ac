#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use phyto_diagnosis::{
    metrics, server, Config, DiagnosisOrchestrator, EdgeClassifier, ProviderCascade,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with filters
    // ONNX Runtime is chatty at info level during session creation
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,ort=warn")
            }),
        )
        .init();

    tracing::info!("Starting plant diagnosis service...");

    metrics::init_metrics();

    let config = Config::load();

    // Weights load once and are shared read-only by every request
    let edge_config = config.edge.clone();
    let edge = tokio::task::spawn_blocking(move || EdgeClassifier::load(&edge_config))
        .await
        .context("edge model loader task failed")?;
    let edge = Arc::new(edge);

    let cascade = ProviderCascade::from_config(&config.cascade)?;
    if cascade.is_configured() {
        tracing::info!("🌐 Vision cascade: {}", cascade.provider_ids().join(" → "));
    } else {
        tracing::warn!("⚠️  No vision API key configured, remote diagnosis disabled");
    }

    let orchestrator = Arc::new(DiagnosisOrchestrator::new(edge, cascade));
    let app = server::router(orchestrator, config.max_upload_bytes);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("🚀 Diagnosis API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
