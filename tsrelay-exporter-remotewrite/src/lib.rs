//! Prometheus remote-write exporter for tsrelay metric batches.
//!
//! This crate converts [`MetricBatch`](tsrelay_common::MetricBatch) values
//! into Prometheus remote-write requests (snappy-compressed protobuf) and
//! posts them to one or more remote-write endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Zenoh Network  │────>│   Subscriber    │────>│   PrwExporter   │────>│ Remote write    │
//! │ (tsrelay/...)   │     │ (decode, spawn) │     │ (convert, send) │     │ endpoint (HTTP) │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! A push validates each metric, expands its datapoints into samples,
//! aggregates them by label set into a [`TimeSeriesMap`], encodes the
//! result and delivers it through a [`Transport`], optionally wrapped with
//! SigV4 signing.
//!
//! # Usage
//!
//! ```bash
//! tsrelay-exporter-remotewrite --config config.json5
//! ```
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod exporter;
pub mod labels;
pub mod proto;
pub mod registry;
pub mod request;
pub mod series;
pub mod shutdown;
pub mod sigv4;
pub mod subscriber;
pub mod transport;

pub use config::{ExporterConfig, RemoteWriteConfig};
pub use error::{DeliveryError, ExportError, PushError, TransportError, combine_errors};
pub use exporter::{ExporterStats, PrwExporter, SharedExporter};
pub use registry::ExporterRegistry;
pub use series::TimeSeriesMap;
pub use sigv4::SigningTransport;
pub use subscriber::MetricSubscriber;
pub use transport::{HttpTransport, SharedTransport, Transport};
