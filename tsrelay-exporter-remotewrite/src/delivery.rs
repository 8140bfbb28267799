//! HTTP delivery of encoded write requests.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{DeliveryError, ExportError};
use crate::transport::SharedTransport;

pub const SNAPPY_ENCODING: &str = "snappy";
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
pub const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

/// Maximum number of response body bytes read on failure.
pub const MAX_ERROR_BODY: usize = 256;

/// Default bound on a single remote-write request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts encoded write requests to one endpoint.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    endpoint: Url,
    headers: HeaderMap,
    timeout: Duration,
    transport: SharedTransport,
}

impl DeliveryClient {
    pub fn new(endpoint: Url, transport: SharedTransport) -> Self {
        Self {
            endpoint,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            transport,
        }
    }

    /// Extra headers sent with every request. The remote-write protocol
    /// headers are always set on top of these.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the POST request carrying `body`.
    pub fn build_request(&self, body: Bytes) -> reqwest::Request {
        let mut request = reqwest::Request::new(Method::POST, self.endpoint.clone());

        let headers = request.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(SNAPPY_ENCODING));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));
        headers.insert(
            HeaderName::from_static(REMOTE_WRITE_VERSION_HEADER),
            HeaderValue::from_static(REMOTE_WRITE_VERSION),
        );

        *request.body_mut() = Some(reqwest::Body::from(body));
        request
    }

    /// Send `body` and check the response.
    ///
    /// The exchange is abandoned when `cancel` fires or the timeout elapses.
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        body: Bytes,
    ) -> Result<(), DeliveryError> {
        let size = body.len();
        let request = self.build_request(body);
        trace!(endpoint = %self.endpoint, bytes = size, "Sending remote write request");

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(endpoint = %self.endpoint, "Remote write request cancelled");
                Err(DeliveryError::Cancelled)
            }

            result = tokio::time::timeout(self.timeout, self.exchange(request)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DeliveryError::Timeout(self.timeout)),
                }
            }
        }
    }

    async fn exchange(&self, request: reqwest::Request) -> Result<(), DeliveryError> {
        let response = self.transport.send(request).await?;
        check_response(response).await
    }
}

async fn check_response(mut response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut snippet = Vec::with_capacity(MAX_ERROR_BODY);
    while snippet.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY - snippet.len());
                snippet.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to read error response body");
                break;
            }
        }
    }

    Err(DeliveryError::Status {
        status,
        line: first_line(&snippet),
    })
}

fn first_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Convert configured header pairs into a header map.
pub fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ExportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str()).map_err(|e| {
            ExportError::construction(format!("invalid header name '{}': {}", name, e))
        })?;
        let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
            ExportError::construction(format!("invalid value for header '{}': {}", name, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
