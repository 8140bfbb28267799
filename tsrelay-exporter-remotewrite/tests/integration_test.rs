//! Integration tests for the remote-write exporter.
//!
//! These tests run the exporter against an in-process remote-write receiver
//! that decodes each snappy-compressed protobuf body it is sent.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tsrelay_common::metrics::{
    DoubleDataPoint, HistogramDataPoint, Int64DataPoint, Metric, MetricBatch, SummaryDataPoint,
    ValueAtPercentile,
};
use tsrelay_exporter_remotewrite::error::ErrorKind;
use tsrelay_exporter_remotewrite::proto::WriteRequest;
use tsrelay_exporter_remotewrite::request::decode_request;
use tsrelay_exporter_remotewrite::{ExporterConfig, PrwExporter, RemoteWriteConfig};

/// A request received by the mock receiver.
#[derive(Debug, Clone)]
struct Received {
    headers: HeaderMap,
    request: WriteRequest,
}

#[derive(Clone)]
struct ReceiverState {
    status: StatusCode,
    reply: &'static str,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn receive(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    match decode_request(&body) {
        Ok(request) => {
            state.received.lock().push(Received { headers, request });
            (state.status, state.reply)
        }
        Err(_) => (StatusCode::BAD_REQUEST, "undecodable body"),
    }
}

/// Start a receiver answering every push with `status`; returns its push URL.
async fn start_receiver(
    status: StatusCode,
    reply: &'static str,
) -> (String, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = ReceiverState {
        status,
        reply,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/api/v1/push", post(receive))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}/api/v1/push", addr), received)
}

fn mixed_batch() -> MetricBatch {
    MetricBatch::from_metrics(vec![
        Metric::double_gauge(
            "temperature",
            vec![DoubleDataPoint::new(21.5, 1_000_000_000).with_label("room", "lab")],
        ),
        Metric::int64_counter(
            "requests",
            vec![Int64DataPoint::new(42, 1_000_000_000).with_label("method", "GET")],
        ),
        Metric::histogram(
            "latency",
            vec![HistogramDataPoint::new(1_000_000_000, 6, 2.5, &[1, 2, 3], &[0.5, 1.0])],
        ),
        Metric::summary(
            "rpc",
            vec![SummaryDataPoint::new(
                1_000_000_000,
                4,
                8.0,
                vec![
                    ValueAtPercentile::new(0.5, 1.5),
                    ValueAtPercentile::new(0.99, 3.0),
                ],
            )],
        ),
    ])
}

fn names(request: &WriteRequest) -> Vec<String> {
    request
        .timeseries
        .iter()
        .map(|ts| {
            ts.labels
                .iter()
                .find(|l| l.name == "__name__")
                .map(|l| l.value.clone())
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn test_end_to_end_push() {
    let (endpoint, received) = start_receiver(StatusCode::NO_CONTENT, "").await;

    let mut target = RemoteWriteConfig::new("mock", endpoint);
    target.namespace = "edge".to_string();
    target.headers = HashMap::from([("X-Scope-OrgID".to_string(), "tenant-1".to_string())]);
    let exporter = PrwExporter::from_config(&target).await.unwrap();

    exporter
        .push_metrics(&CancellationToken::new(), &mixed_batch())
        .await
        .unwrap();

    let received = received.lock().clone();
    assert_eq!(received.len(), 1);
    let Received { headers, request } = &received[0];

    assert_eq!(headers["content-encoding"], "snappy");
    assert_eq!(headers["content-type"], "application/x-protobuf");
    assert_eq!(headers["x-prometheus-remote-write-version"], "0.1.0");
    assert_eq!(headers["x-scope-orgid"], "tenant-1");

    // gauge + counter + histogram (sum, count, 2 buckets, +Inf)
    // + summary (sum, count, 2 quantiles)
    assert_eq!(request.timeseries.len(), 11);
    let names = names(request);
    assert!(names.iter().all(|n| n.starts_with("edge_")), "{names:?}");
    assert!(names.contains(&"edge_latency_bucket".to_string()));
    assert!(names.contains(&"edge_rpc_count".to_string()));

    let inf = request
        .timeseries
        .iter()
        .find(|ts| ts.labels.iter().any(|l| l.name == "le" && l.value == "+Inf"))
        .unwrap();
    assert_eq!(inf.samples[0].value, 6.0);
    assert!(
        request
            .timeseries
            .iter()
            .all(|ts| ts.samples.iter().all(|s| s.timestamp == 1000))
    );

    let stats = exporter.stats();
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.series_sent, 11);
    assert_eq!(stats.metrics_dropped, 0);
}

#[tokio::test]
async fn test_rejected_push_reports_status() {
    let (endpoint, received) = start_receiver(
        StatusCode::TOO_MANY_REQUESTS,
        "rate limit exceeded\nretry later",
    )
    .await;
    let exporter = PrwExporter::from_config(&RemoteWriteConfig::new("mock", endpoint))
        .await
        .unwrap();

    let err = exporter
        .push_metrics(&CancellationToken::new(), &mixed_batch())
        .await
        .unwrap_err();

    assert_eq!(err.dropped, 4);
    assert_eq!(err.error.kind(), ErrorKind::Delivery);
    assert_eq!(
        err.error.to_string(),
        "server returned HTTP status 429 Too Many Requests: rate limit exceeded"
    );
    // The receiver still saw the request.
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let exporter = PrwExporter::from_config(&RemoteWriteConfig::new(
        "closed",
        format!("http://{}/api/v1/push", addr),
    ))
    .await
    .unwrap();

    let err = exporter
        .push_metrics(&CancellationToken::new(), &mixed_batch())
        .await
        .unwrap_err();
    assert_eq!(err.dropped, 4);
    assert_eq!(err.error.kind(), ErrorKind::Delivery);
}

#[tokio::test]
async fn test_concurrent_pushes_then_shutdown() {
    let (endpoint, received) = start_receiver(StatusCode::OK, "").await;
    let exporter = Arc::new(
        PrwExporter::from_config(&RemoteWriteConfig::new("mock", endpoint))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let exporter = exporter.clone();
        handles.push(tokio::spawn(async move {
            let batch = MetricBatch::from_metrics(vec![Metric::int64_gauge(
                "worker_queue",
                vec![Int64DataPoint::new(i, 1_000_000).with_label("worker", i.to_string())],
            )]);
            exporter
                .push_metrics(&CancellationToken::new(), &batch)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    exporter.shutdown(&CancellationToken::new()).await.unwrap();
    assert_eq!(received.lock().len(), 8);

    let err = exporter
        .push_metrics(&CancellationToken::new(), &mixed_batch())
        .await
        .unwrap_err();
    assert_eq!(err.dropped, 4);
    assert_eq!(err.error.to_string(), "shutdown has been called");
    assert_eq!(received.lock().len(), 8);
}

#[tokio::test]
async fn test_exporter_from_config_file() {
    let (endpoint, received) = start_receiver(StatusCode::OK, "").await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exporter.json5");
    std::fs::write(
        &path,
        format!(
            r#"{{
                // local receiver
                remote_write: [{{ name: "local", endpoint: "{}", namespace: "cfg" }}],
            }}"#,
            endpoint
        ),
    )
    .unwrap();

    let config = ExporterConfig::load_from_file(&path).unwrap();
    let exporter = PrwExporter::from_config(&config.remote_write[0]).await.unwrap();

    exporter
        .push_metrics(&CancellationToken::new(), &mixed_batch())
        .await
        .unwrap();

    let received = received.lock();
    assert!(names(&received[0].request).iter().all(|n| n.starts_with("cfg_")));
}
