//! AWS SigV4 request signing as a transport decorator.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, trace};

use crate::error::{ExportError, TransportError};
use crate::transport::{SharedTransport, Transport};

/// Transport that signs every request with SigV4 before delegating.
///
/// The request body must be buffered in memory so it can be hashed.
pub struct SigningTransport {
    region: String,
    service: String,
    credentials: SharedCredentialsProvider,
    inner: SharedTransport,
}

impl fmt::Debug for SigningTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningTransport")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl SigningTransport {
    pub fn builder() -> SigningTransportBuilder {
        SigningTransportBuilder::default()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn sign_request(&self, request: &mut reqwest::Request) -> Result<(), TransportError> {
        let body: &[u8] = match request.body() {
            Some(body) => body.as_bytes().ok_or(TransportError::UnbufferedBody)?,
            None => &[],
        };

        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| TransportError::Credentials(e.to_string()))?;
        let identity: Identity = credentials.into();

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| TransportError::Signing(e.to_string()))?
            .into();

        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                value
                    .to_str()
                    .map(|v| (name.as_str(), v))
                    .map_err(|_| {
                        TransportError::Signing(format!("non-ASCII value for header {}", name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let signable = SignableRequest::new(
            request.method().as_str(),
            request.url().as_str(),
            headers.into_iter(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| TransportError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| TransportError::Signing(e.to_string()))?
            .into_parts();

        let signed: Vec<(HeaderName, HeaderValue)> = instructions
            .headers()
            .map(|(name, value)| {
                let name = HeaderName::try_from(name)
                    .map_err(|e| TransportError::Signing(e.to_string()))?;
                let value = HeaderValue::try_from(value)
                    .map_err(|e| TransportError::Signing(e.to_string()))?;
                Ok((name, value))
            })
            .collect::<Result<_, TransportError>>()?;

        for (name, value) in signed {
            trace!(header = %name, "Setting signature header");
            request.headers_mut().insert(name, value);
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SigningTransport {
    async fn send(
        &self,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, TransportError> {
        self.sign_request(&mut request).await?;
        self.inner.send(request).await
    }
}

/// Builder for [`SigningTransport`].
///
/// Region, service and the wrapped transport are required; empty strings
/// count as missing.
#[derive(Default)]
pub struct SigningTransportBuilder {
    region: Option<String>,
    service: Option<String>,
    transport: Option<SharedTransport>,
    credentials: Option<SharedCredentialsProvider>,
}

impl SigningTransportBuilder {
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Transport the signed requests are handed to.
    pub fn transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an explicit credentials provider instead of the default chain.
    pub fn credentials_provider(mut self, provider: SharedCredentialsProvider) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Validate the settings and resolve the credentials provider.
    ///
    /// Without an explicit provider the default AWS chain is used
    /// (environment, shared config files, container or instance role).
    pub async fn build(self) -> Result<SigningTransport, ExportError> {
        let region = self
            .region
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ExportError::construction("signing region is required"))?;
        let service = self
            .service
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExportError::construction("signing service name is required"))?;
        let inner = self
            .transport
            .ok_or_else(|| ExportError::construction("signing requires a base transport"))?;

        let credentials = match self.credentials {
            Some(provider) => provider,
            None => {
                debug!(region = %region, "Loading AWS credentials from the default chain");
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .load()
                    .await
                    .credentials_provider()
                    .ok_or_else(|| {
                        ExportError::construction("no AWS credentials provider available")
                    })?
            }
        };

        Ok(SigningTransport {
            region,
            service,
            credentials,
            inner,
        })
    }
}
