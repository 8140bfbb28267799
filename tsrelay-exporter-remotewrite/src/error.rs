//! Error types for the remote-write exporter.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tsrelay_common::metrics::{MetricType, Temporality};

/// Errors raised while converting, delivering or shutting down.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported metric type {metric_type} in metric {name}")]
    UnsupportedType {
        name: String,
        metric_type: MetricType,
    },

    #[error("invalid temporality and type combination in metric {name}: {metric_type} is {temporality}")]
    InvalidTemporality {
        name: String,
        metric_type: MetricType,
        temporality: Temporality,
    },

    #[error("nil data point field in metric {name}")]
    MissingDataPoints { name: String },

    #[error("invalid exporter configuration: {0}")]
    Construction(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("shutdown has been called")]
    Shutdown,

    #[error("shutdown interrupted before in-flight pushes drained")]
    ShutdownInterrupted,

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Coarse classification of an [`ExportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    MalformedMetric,
    Construction,
    Delivery,
    ShutdownRejection,
    ShutdownInterrupted,
    Batch,
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::UnsupportedType { .. } | ExportError::InvalidTemporality { .. } => {
                ErrorKind::Validation
            }
            ExportError::MissingDataPoints { .. } => ErrorKind::MalformedMetric,
            ExportError::Construction(_) => ErrorKind::Construction,
            ExportError::Delivery(_) => ErrorKind::Delivery,
            ExportError::Shutdown => ErrorKind::ShutdownRejection,
            ExportError::ShutdownInterrupted => ErrorKind::ShutdownInterrupted,
            ExportError::Batch(_) => ErrorKind::Batch,
        }
    }

    pub(crate) fn construction(message: impl Into<String>) -> Self {
        ExportError::Construction(message.into())
    }
}

/// Failures while building or sending one write request.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to encode write request: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("failed to compress write request: {0}")]
    Compress(#[from] snap::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx response. `line` is the first line of at most 256 body bytes.
    #[error("server returned HTTP status {status}: {line}")]
    Status {
        status: reqwest::StatusCode,
        line: String,
    },

    #[error("remote write request timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote write request cancelled")]
    Cancelled,
}

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("request body cannot be re-read for signing")]
    UnbufferedBody,

    #[error("failed to resolve signing credentials: {0}")]
    Credentials(String),
}

/// Several errors reported together, formatted as `[e1; e2; ...]`.
#[derive(Debug)]
pub struct BatchError {
    errors: Vec<ExportError>,
}

impl BatchError {
    pub fn errors(&self) -> &[ExportError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for BatchError {}

/// Fold a list of errors into at most one.
///
/// No errors gives `None`, a single error is returned as is, and anything
/// more becomes a [`BatchError`] keeping the original order.
pub fn combine_errors(mut errors: Vec<ExportError>) -> Option<ExportError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(ExportError::Batch(BatchError { errors })),
    }
}

/// Outcome of a failed push: how many metrics were dropped and why.
#[derive(Debug, Error)]
#[error("{dropped} metric(s) dropped: {error}")]
pub struct PushError {
    pub dropped: usize,
    #[source]
    pub error: ExportError,
}

impl PushError {
    pub fn new(dropped: usize, error: ExportError) -> Self {
        Self { dropped, error }
    }
}
