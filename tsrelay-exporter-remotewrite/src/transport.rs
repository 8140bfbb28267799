//! The "send a request, get a response" seam used by delivery.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// Sends one HTTP request and returns the response.
///
/// Implementations must be safe to share between concurrent pushes.
/// Decorators such as [`SigningTransport`](crate::sigv4::SigningTransport)
/// implement this trait on top of another transport.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError>;
}

/// Shared handle to a transport.
pub type SharedTransport = Arc<dyn Transport>;

/// Plain HTTP transport backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}
