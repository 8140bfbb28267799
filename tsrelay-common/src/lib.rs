//! tsrelay common library
//!
//! Shared types and utilities for the tsrelay metric pipeline:
//!
//! - [`metrics`] - Metric batch data model (`MetricBatch`, `Metric`, datapoints)
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`keyexpr`] - Key expression builders and parsers
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod keyexpr;
pub mod metrics;
pub mod serialization;
pub mod session;

pub use config::{
    BaseConfig, LogFormat, LoggingConfig, ZenohConfig, ZenohMode, load_config, parse_config,
};
pub use error::{Error, Result};
pub use keyexpr::{
    KEY_PREFIX, KeyExprBuilder, ParsedKeyExpr, all_metrics_wildcard, parse_key_expr,
};
pub use metrics::{
    DoubleDataPoint, HistogramBucket, HistogramDataPoint, InstrumentationLibrary,
    InstrumentationLibraryMetrics, Int64DataPoint, Metric, MetricBatch, MetricData,
    MetricDescriptor, MetricType, ResourceMetrics, SummaryDataPoint, Temporality,
    ValueAtPercentile, current_timestamp_nanos,
};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use tsrelay_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|e| Error::Tracing(e.to_string()))
}
