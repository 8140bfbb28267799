//! Named set of exporters owned by the process entry point.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tsrelay_common::metrics::MetricBatch;

use crate::error::{ExportError, PushError, combine_errors};
use crate::exporter::SharedExporter;

/// Exporters registered under unique names, in registration order.
#[derive(Debug, Default)]
pub struct ExporterRegistry {
    exporters: Vec<(String, SharedExporter)>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exporter. Fails if `name` is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        exporter: SharedExporter,
    ) -> Result<(), ExportError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(ExportError::construction(format!(
                "exporter '{}' is already registered",
                name
            )));
        }
        info!(name = %name, endpoint = %exporter.endpoint(), "Registered remote write exporter");
        self.exporters.push((name, exporter));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SharedExporter> {
        self.exporters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, exporter)| exporter)
    }

    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedExporter)> {
        self.exporters.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Push `batch` to every exporter concurrently.
    ///
    /// Outcomes are returned in registration order.
    pub async fn push_all(
        &self,
        cancel: &CancellationToken,
        batch: &MetricBatch,
    ) -> Vec<(String, Result<(), PushError>)> {
        let pushes = self.exporters.iter().map(|(name, exporter)| async move {
            (name.clone(), exporter.push_metrics(cancel, batch).await)
        });
        join_all(pushes).await
    }

    /// Shut every exporter down concurrently.
    pub async fn shutdown_all(&self, cancel: &CancellationToken) -> Result<(), ExportError> {
        let results = join_all(
            self.exporters
                .iter()
                .map(|(_, exporter)| exporter.shutdown(cancel)),
        )
        .await;

        let errors: Vec<ExportError> = self
            .exporters
            .iter()
            .zip(results)
            .filter_map(|((name, _), result)| {
                result
                    .inspect_err(|e| warn!(name = %name, error = %e, "Exporter shutdown failed"))
                    .err()
            })
            .collect();

        match combine_errors(errors) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::PrwExporter;
    use crate::shutdown::ShutdownState;
    use crate::transport::mock::MockTransport;
    use std::sync::Arc;
    use tsrelay_common::metrics::{Int64DataPoint, Metric};

    fn exporter(transport: Arc<MockTransport>) -> SharedExporter {
        Arc::new(
            PrwExporter::builder()
                .endpoint("http://localhost:9009/push")
                .transport(transport)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ExporterRegistry::new();
        registry
            .register("cortex", exporter(Arc::new(MockTransport::ok())))
            .unwrap();

        let err = registry
            .register("cortex", exporter(Arc::new(MockTransport::ok())))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("cortex").is_some());
        assert!(registry.get("other").is_none());
    }

    #[tokio::test]
    async fn test_push_all_reports_each_exporter() {
        let healthy = Arc::new(MockTransport::ok());
        let failing = Arc::new(MockTransport::new(503, "unavailable"));

        let mut registry = ExporterRegistry::new();
        registry.register("healthy", exporter(healthy.clone())).unwrap();
        registry.register("failing", exporter(failing.clone())).unwrap();

        let batch = MetricBatch::from_metrics(vec![Metric::int64_counter(
            "jobs",
            vec![Int64DataPoint::new(1, 1_000_000)],
        )]);
        let outcomes = registry.push_all(&CancellationToken::new(), &batch).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "healthy");
        assert!(outcomes[0].1.is_ok());
        assert_eq!(outcomes[1].0, "failing");
        assert_eq!(outcomes[1].1.as_ref().unwrap_err().dropped, 1);

        assert_eq!(healthy.request_count(), 1);
        assert_eq!(failing.request_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let mut registry = ExporterRegistry::new();
        registry.register("a", exporter(Arc::new(MockTransport::ok()))).unwrap();
        registry.register("b", exporter(Arc::new(MockTransport::ok()))).unwrap();

        registry.shutdown_all(&CancellationToken::new()).await.unwrap();

        for (_, exporter) in registry.iter() {
            assert_eq!(exporter.state(), ShutdownState::Terminated);
        }
    }
}
