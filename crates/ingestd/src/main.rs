mod adapters;
mod app;
mod runner;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ingestd=info".into()),
        )
        .init();

    let config_path = std::env::var("INGESTD_CONFIG").ok();
    let config = ingest_core::config::IngestConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        ingest_core::config::IngestConfig::default()
    });

    let metrics_bind: std::net::SocketAddr = config.metrics.bind.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_bind)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus exporter: {e}"))?;
    info!(bind = %metrics_bind, "metrics exporter listening");

    let runtime = app::build(config).await?;
    let shutdown_rx = runtime.shutdown_tx.subscribe();
    let shutdown_tx = runtime.shutdown_tx;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received, draining supervised tasks");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = runtime.supervisor.run(shutdown_rx).await {
        error!(error = %e, "supervisor exited with a fatal error");
        return Err(e.into());
    }

    Ok(())
}
