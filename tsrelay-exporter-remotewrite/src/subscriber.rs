//! Zenoh subscriber feeding metric batches to the exporters.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tsrelay_common::config::ZenohConfig;
use tsrelay_common::keyexpr::{all_metrics_wildcard, parse_key_expr};
use tsrelay_common::metrics::MetricBatch;
use tsrelay_common::{decode_auto, session};
use zenoh::sample::SampleKind;

use crate::registry::ExporterRegistry;

/// Default time allowed for in-flight pushes when stopping.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Counters reported when the subscriber stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriberStats {
    pub batches_received: u64,
    pub batches_invalid: u64,
    pub pushes_failed: u64,
}

/// Subscribes to metric batches and pushes each one to every exporter.
pub struct MetricSubscriber {
    registry: Arc<ExporterRegistry>,
    zenoh_config: ZenohConfig,
    key_expr: String,
    drain_timeout: Duration,
}

impl MetricSubscriber {
    /// Create a new subscriber.
    pub fn new(registry: Arc<ExporterRegistry>, zenoh_config: ZenohConfig) -> Self {
        Self {
            registry,
            zenoh_config,
            key_expr: all_metrics_wildcard(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Set a custom key expression to subscribe to.
    pub fn with_key_expr(mut self, key_expr: impl Into<String>) -> Self {
        self.key_expr = key_expr.into();
        self
    }

    /// How long to wait for running pushes once shutdown is signalled.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Run until the shutdown signal is received.
    ///
    /// Each batch is pushed in its own task. On shutdown the subscriber
    /// stops receiving and waits for those tasks, cancelling them if they
    /// outlast the drain timeout.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<SubscriberStats> {
        let session = session::connect(&self.zenoh_config).await?;

        info!(key_expr = %self.key_expr, "Subscribing to metric batches");
        let subscriber = session
            .declare_subscriber(&self.key_expr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create subscriber: {}", e))?;

        let cancel = CancellationToken::new();
        let mut pushes: JoinSet<usize> = JoinSet::new();
        let mut stats = SubscriberStats::default();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping subscriber");
                        break;
                    }
                }

                Some(joined) = pushes.join_next(), if !pushes.is_empty() => {
                    match joined {
                        Ok(failed) => stats.pushes_failed += failed as u64,
                        Err(e) => warn!(error = %e, "Push task failed"),
                    }
                }

                sample = subscriber.recv_async() => {
                    let sample = match sample {
                        Ok(sample) => sample,
                        Err(e) => {
                            warn!("Error receiving sample: {}", e);
                            continue;
                        }
                    };

                    if sample.kind() == SampleKind::Delete {
                        trace!(key = %sample.key_expr(), "Ignoring delete sample");
                        continue;
                    }

                    let key = sample.key_expr().as_str().to_string();
                    let payload = sample.payload().to_bytes();
                    let batch: MetricBatch = match decode_auto(&payload) {
                        Ok(batch) => batch,
                        Err(e) => {
                            stats.batches_invalid += 1;
                            debug!(
                                key = %key,
                                payload_len = payload.len(),
                                error = %e,
                                "Failed to decode metric batch"
                            );
                            continue;
                        }
                    };

                    stats.batches_received += 1;
                    let source = parse_key_expr(&key)
                        .map(|parsed| parsed.source.to_string())
                        .unwrap_or(key);
                    trace!(source = %source, metrics = batch.metric_count(), "Received metric batch");

                    let registry = self.registry.clone();
                    let cancel = cancel.clone();
                    pushes.spawn(async move {
                        push_batch(&registry, &cancel, &source, &batch).await
                    });
                }
            }
        }

        subscriber
            .undeclare()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to undeclare subscriber: {}", e))?;

        if !pushes.is_empty() {
            info!(pending = pushes.len(), "Waiting for in-flight pushes");
            let drained = tokio::time::timeout(self.drain_timeout, async {
                while let Some(joined) = pushes.join_next().await {
                    if let Ok(failed) = joined {
                        stats.pushes_failed += failed as u64;
                    }
                }
            })
            .await;

            if drained.is_err() {
                warn!(pending = pushes.len(), "Drain timeout elapsed, cancelling pushes");
                cancel.cancel();
                while pushes.join_next().await.is_some() {}
            }
        }

        session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close session: {}", e))?;

        info!(
            batches_received = stats.batches_received,
            batches_invalid = stats.batches_invalid,
            pushes_failed = stats.pushes_failed,
            "Subscriber stopped"
        );
        Ok(stats)
    }
}

/// Push one batch to every exporter and log the outcomes. Returns the number
/// of exporters that reported an error.
async fn push_batch(
    registry: &ExporterRegistry,
    cancel: &CancellationToken,
    source: &str,
    batch: &MetricBatch,
) -> usize {
    let mut failed = 0;
    for (name, outcome) in registry.push_all(cancel, batch).await {
        if let Err(e) = outcome {
            failed += 1;
            warn!(
                exporter = %name,
                source = %source,
                dropped = e.dropped,
                error = %e.error,
                "Push failed"
            );
        }
    }
    failed
}
