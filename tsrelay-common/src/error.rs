use thiserror::Error;

use crate::serialization::Format;

/// Common error type for tsrelay components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("Failed to encode {format} payload: {message}")]
    Encode { format: Format, message: String },

    #[error("Failed to decode {format} payload: {message}")]
    Decode { format: Format, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key expression: {0}")]
    KeyExpr(String),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl Error {
    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Error::Encode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        Error::Decode {
            format,
            message: err.to_string(),
        }
    }
}

/// Result type alias using tsrelay's Error.
pub type Result<T> = std::result::Result<T, Error>;
