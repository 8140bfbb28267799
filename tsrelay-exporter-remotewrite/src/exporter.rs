//! The remote-write exporter.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Url;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tsrelay_common::metrics::MetricBatch;

use crate::config::{RemoteWriteConfig, TlsConfig};
use crate::convert::add_metric;
use crate::delivery::{DEFAULT_TIMEOUT, DeliveryClient, header_map};
use crate::error::{DeliveryError, ExportError, PushError, combine_errors};
use crate::request::{build_write_request, encode_request};
use crate::series::TimeSeriesMap;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::sigv4::SigningTransport;
use crate::transport::{HttpTransport, SharedTransport};

/// Counters kept by an exporter over its lifetime.
#[derive(Debug, Clone, Default)]
pub struct ExporterStats {
    /// Push calls, including rejected ones.
    pub pushes: u64,
    /// Pushes refused because shutdown had started.
    pub pushes_rejected: u64,
    pub metrics_received: u64,
    pub metrics_dropped: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub series_sent: u64,
    pub samples_sent: u64,
}

/// Converts metric batches to remote-write requests and delivers them.
///
/// Pushes may run concurrently; each one aggregates into its own
/// [`TimeSeriesMap`].
#[derive(Debug)]
pub struct PrwExporter {
    namespace: String,
    delivery: DeliveryClient,
    coordinator: ShutdownCoordinator,
    stats: RwLock<ExporterStats>,
}

/// Shared exporter handle.
pub type SharedExporter = Arc<PrwExporter>;

impl PrwExporter {
    pub fn builder() -> PrwExporterBuilder {
        PrwExporterBuilder::default()
    }

    /// Build an exporter from one configured remote-write target.
    ///
    /// When `auth` is set the HTTP transport is wrapped with SigV4 signing.
    pub async fn from_config(config: &RemoteWriteConfig) -> Result<Self, ExportError> {
        let client = http_client(&config.tls)?;
        let mut transport: SharedTransport = Arc::new(HttpTransport::new(client));

        if let Some(auth) = &config.auth {
            let mut signer = SigningTransport::builder().transport(transport);
            if let Some(region) = &auth.region {
                signer = signer.region(region.clone());
            }
            if let Some(service) = &auth.service {
                signer = signer.service(service.clone());
            }
            transport = Arc::new(signer.build().await?);
        }

        Self::builder()
            .namespace(config.namespace.clone())
            .endpoint(config.endpoint.clone())
            .headers(header_map(&config.headers)?)
            .timeout(Duration::from_secs(config.timeout_secs))
            .transport(transport)
            .build()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn endpoint(&self) -> &Url {
        self.delivery.endpoint()
    }

    pub fn state(&self) -> ShutdownState {
        self.coordinator.state()
    }

    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    /// Convert and deliver one batch.
    ///
    /// Metrics that fail validation are dropped one by one and the rest are
    /// still sent. A delivery failure drops the whole batch. After
    /// [`shutdown`](Self::shutdown) has started every push is rejected
    /// without any conversion work.
    pub async fn push_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricBatch,
    ) -> Result<(), PushError> {
        let total = batch.metric_count();
        {
            let mut stats = self.stats.write();
            stats.pushes += 1;
            stats.metrics_received += total as u64;
        }

        let _guard = match self.coordinator.admit() {
            Ok(guard) => guard,
            Err(e) => {
                let mut stats = self.stats.write();
                stats.pushes_rejected += 1;
                stats.metrics_dropped += total as u64;
                debug!(metrics = total, "Push rejected, exporter is shutting down");
                return Err(PushError::new(total, e));
            }
        };

        let mut series = TimeSeriesMap::new();
        let mut dropped = 0;
        let mut errors = Vec::new();

        for metric in batch.metrics() {
            if let Err(e) = add_metric(&mut series, metric, &self.namespace) {
                debug!(metric = %metric.name(), error = %e, "Dropping metric");
                dropped += 1;
                errors.push(e);
            }
        }

        let series_count = series.len();
        let sample_count = series.sample_count();

        match self.send(cancel, series).await {
            Ok(()) => {
                let mut stats = self.stats.write();
                stats.requests_sent += 1;
                stats.series_sent += series_count as u64;
                stats.samples_sent += sample_count as u64;
                trace!(series = series_count, samples = sample_count, "Remote write delivered");
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint(),
                    metrics = total,
                    error = %e,
                    "Remote write failed"
                );
                self.stats.write().requests_failed += 1;
                dropped = total;
                errors.push(e.into());
            }
        }

        self.stats.write().metrics_dropped += dropped as u64;
        match combine_errors(errors) {
            Some(error) => Err(PushError::new(dropped, error)),
            None => Ok(()),
        }
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        series: TimeSeriesMap,
    ) -> Result<(), DeliveryError> {
        let request = build_write_request(series);
        let body = encode_request(&request)?;
        self.delivery.deliver(cancel, body).await
    }

    /// Reject new pushes and wait for in-flight ones to complete.
    ///
    /// Repeated calls are a no-op once drained.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> Result<(), ExportError> {
        if self.coordinator.state() == ShutdownState::Active {
            info!(
                endpoint = %self.endpoint(),
                in_flight = self.coordinator.in_flight(),
                "Shutting down remote write exporter"
            );
        }
        self.coordinator.shutdown(cancel).await
    }
}

/// Build the HTTP client for a target, applying its TLS settings.
fn http_client(tls: &TlsConfig) -> Result<reqwest::Client, ExportError> {
    let mut builder = reqwest::Client::builder();

    if let Some(ca_file) = &tls.ca_file {
        let pem = read_pem(ca_file)?;
        for cert in reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            ExportError::construction(format!("invalid CA file {}: {}", ca_file.display(), e))
        })? {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) {
        let mut pem = read_pem(cert_file)?;
        pem.push(b'\n');
        pem.extend(read_pem(key_file)?);
        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            ExportError::construction(format!(
                "invalid client certificate {}: {}",
                cert_file.display(),
                e
            ))
        })?;
        builder = builder.identity(identity);
    }

    if tls.insecure_skip_verify {
        warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| ExportError::construction(format!("failed to build HTTP client: {}", e)))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ExportError> {
    std::fs::read(path)
        .map_err(|e| ExportError::construction(format!("failed to read {}: {}", path.display(), e)))
}

/// Builder for [`PrwExporter`].
#[derive(Debug)]
pub struct PrwExporterBuilder {
    namespace: String,
    endpoint: Option<String>,
    transport: Option<SharedTransport>,
    headers: HeaderMap,
    timeout: Duration,
}

impl Default for PrwExporterBuilder {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            endpoint: None,
            transport: None,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PrwExporterBuilder {
    /// Prefix joined to every metric name with `_`. Empty means none.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Absolute `http` or `https` URL of the remote-write endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<PrwExporter, ExportError> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| ExportError::construction("endpoint is required"))?;
        let url = Url::parse(&endpoint).map_err(|e| {
            ExportError::construction(format!("invalid endpoint URL '{}': {}", endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExportError::construction(format!(
                "endpoint URL '{}' must use http or https",
                endpoint
            )));
        }

        let transport = self
            .transport
            .ok_or_else(|| ExportError::construction("HTTP transport is required"))?;

        if self.timeout.is_zero() {
            return Err(ExportError::construction("timeout must be greater than zero"));
        }

        let delivery = DeliveryClient::new(url, transport)
            .with_headers(self.headers)
            .with_timeout(self.timeout);

        Ok(PrwExporter {
            namespace: self.namespace,
            delivery,
            coordinator: ShutdownCoordinator::new(),
            stats: RwLock::new(ExporterStats::default()),
        })
    }
}
