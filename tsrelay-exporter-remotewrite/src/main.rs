//! Prometheus remote-write exporter for tsrelay metric batches.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tsrelay_common::{LoggingConfig, init_tracing};
use tsrelay_exporter_remotewrite::{
    ExporterConfig, ExporterRegistry, MetricSubscriber, PrwExporter,
};

/// Prometheus remote-write exporter for tsrelay.
#[derive(Parser, Debug)]
#[command(name = "tsrelay-exporter-remotewrite")]
#[command(about = "Push tsrelay metric batches to Prometheus remote-write endpoints")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Remote-write endpoint URL (overrides the first configured target).
    #[arg(long)]
    endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides the config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExporterConfig::read_file(path)?,
        None => ExporterConfig::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config.override_endpoint(endpoint);
    }
    config.validate()?;

    let level = args.log_level.unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&LoggingConfig {
        level: format!("{},zenoh=warn,hyper=warn,aws_config=warn", level),
        format: config.logging.format,
    })?;

    info!("Starting tsrelay remote-write exporter");

    let mut registry = ExporterRegistry::new();
    for target in &config.remote_write {
        let exporter = PrwExporter::from_config(target).await?;
        registry.register(target.name.clone(), Arc::new(exporter))?;
    }
    let registry = Arc::new(registry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drain_timeout = Duration::from_secs(config.subscriber.drain_timeout_secs);

    let subscriber = MetricSubscriber::new(registry.clone(), config.zenoh.clone())
        .with_key_expr(config.subscriber.key_expr.clone())
        .with_drain_timeout(drain_timeout);
    let mut subscriber_task = tokio::spawn(async move {
        if let Err(e) = subscriber.run(shutdown_rx).await {
            error!("Subscriber error: {}", e);
        }
    });

    let subscriber_exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            false
        }
        _ = terminate_signal() => {
            info!("Received SIGTERM, shutting down...");
            false
        }
        _ = &mut subscriber_task => {
            warn!("Subscriber exited, shutting down...");
            true
        }
    };

    if !subscriber_exited {
        let _ = shutdown_tx.send(true);
        let _ = subscriber_task.await;
    }

    // Bound the exporter drain with the same timeout.
    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(drain_timeout).await;
            cancel.cancel();
        })
    };
    if let Err(e) = registry.shutdown_all(&cancel).await {
        warn!(error = %e, "Exporters did not shut down cleanly");
    }
    timer.abort();

    for (name, exporter) in registry.iter() {
        let stats = exporter.stats();
        info!(
            exporter = %name,
            pushes = stats.pushes,
            metrics_received = stats.metrics_received,
            metrics_dropped = stats.metrics_dropped,
            requests_sent = stats.requests_sent,
            requests_failed = stats.requests_failed,
            series_sent = stats.series_sent,
            samples_sent = stats.samples_sent,
            "Final statistics"
        );
    }

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
