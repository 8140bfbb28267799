//! Configuration for the remote-write exporter.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tsrelay_common::config::{LoggingConfig, ZenohConfig};
use tsrelay_common::keyexpr::all_metrics_wildcard;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Where metric batches are read from.
    #[serde(default)]
    pub subscriber: SubscriberConfig,

    /// Remote-write targets. Every batch is pushed to each of them.
    #[serde(default)]
    pub remote_write: Vec<RemoteWriteConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Key expression to subscribe to (default: "tsrelay/metrics/**").
    #[serde(default = "default_key_expr")]
    pub key_expr: String,

    /// How long to wait for in-flight pushes on shutdown before cancelling
    /// them (seconds).
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_key_expr() -> String {
    all_metrics_wildcard()
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            key_expr: default_key_expr(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

/// One remote-write backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWriteConfig {
    /// Unique target name, used in logs and statistics.
    #[serde(default = "default_target_name")]
    pub name: String,

    /// Absolute URL of the remote-write endpoint.
    pub endpoint: String,

    /// Prefix joined to metric names with `_` (default: none).
    #[serde(default)]
    pub namespace: String,

    /// Per-request timeout (default: 5 seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// SigV4 signing. Requests are sent unsigned when absent.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// TLS client settings for HTTPS endpoints.
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_target_name() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    5
}

impl RemoteWriteConfig {
    /// A target with default settings for `endpoint`.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            namespace: String::new(),
            timeout_secs: default_timeout(),
            headers: HashMap::new(),
            auth: None,
            tls: TlsConfig::default(),
        }
    }
}

/// SigV4 signing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// AWS region, e.g. "us-east-1".
    #[serde(default)]
    pub region: Option<String>,

    /// Service name to sign for, e.g. "aps".
    #[serde(default)]
    pub service: Option<String>,
}

/// TLS client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM file with extra CA certificates to trust.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate, for mutual TLS. Requires `key_file`.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key matching `cert_file`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    fn validate(&self, target: &str) -> Result<(), ConfigError> {
        let paths = [
            ("ca_file", &self.ca_file),
            ("cert_file", &self.cert_file),
            ("key_file", &self.key_file),
        ];
        for (field, path) in paths {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "remote_write target '{}': tls.{} cannot be empty",
                    target, field
                )));
            }
        }

        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::Validation(format!(
                "remote_write target '{}': tls.cert_file and tls.key_file must be set together",
                target
            )));
        }
        Ok(())
    }
}

impl ExporterConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON5 file without validating it, so overrides can be applied
    /// first.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Point the first target at `endpoint`, adding a target if none exist.
    pub fn override_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        match self.remote_write.first_mut() {
            Some(target) => target.endpoint = endpoint,
            None => self
                .remote_write
                .push(RemoteWriteConfig::new(default_target_name(), endpoint)),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zenoh
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.subscriber.key_expr.is_empty() {
            return Err(ConfigError::Validation(
                "subscriber.key_expr cannot be empty".to_string(),
            ));
        }

        if self.subscriber.drain_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "drain_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.remote_write.is_empty() {
            return Err(ConfigError::Validation(
                "At least one remote_write target is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.remote_write {
            if target.name.is_empty() {
                return Err(ConfigError::Validation(
                    "remote_write target name cannot be empty".to_string(),
                ));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate remote_write target name: {}",
                    target.name
                )));
            }
            if target.endpoint.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "remote_write target '{}' has no endpoint",
                    target.name
                )));
            }
            if target.timeout_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "remote_write target '{}': timeout_secs must be > 0",
                    target.name
                )));
            }
            target.tls.validate(&target.name)?;
        }

        Ok(())
    }
}
