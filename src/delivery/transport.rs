//! # Outbound webhook transport.
//!
//! [`Transport`] performs exactly one POST attempt; retrying is the caller's
//! business. [`HttpTransport`] (feature `http`) is the reqwest-backed
//! implementation.

use async_trait::async_trait;

use super::config::Credentials;
use super::error::TransportError;

/// One webhook POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    /// JSON body.
    pub body: String,
    pub credentials: Option<Credentials>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` once; any non-success status is an error.
    async fn post(&self, request: &WebhookRequest) -> Result<(), TransportError>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::{Client, Url};
    use tracing::debug;

    use super::{Transport, WebhookRequest};
    use crate::delivery::error::TransportError;

    /// reqwest transport: POST, `application/json`, optional basic auth.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        /// Per-attempt timeout.
        pub const TIMEOUT: Duration = Duration::from_secs(60);

        pub fn new() -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(Self::TIMEOUT)
                .build()
                .map_err(classify)?;
            Ok(Self { client })
        }

        /// Uses a preconfigured client (proxies, trust roots, timeouts).
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn post(&self, request: &WebhookRequest) -> Result<(), TransportError> {
            let url = Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl {
                message: e.to_string(),
            })?;

            debug!(url = %url, bytes = request.body.len(), "sending webhook");
            let mut builder = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(request.body.clone());
            if let Some(creds) = &request.credentials {
                builder = builder.basic_auth(&creds.username, Some(&creds.password));
            }

            let response = builder.send().await.map_err(classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or_default().to_string(),
                });
            }
            Ok(())
        }
    }

    fn classify(e: reqwest::Error) -> TransportError {
        let message = e.to_string();
        if e.is_timeout() {
            TransportError::Timeout { message }
        } else if e.is_connect() {
            TransportError::Connect { message }
        } else if e.is_builder() {
            TransportError::InvalidUrl { message }
        } else {
            TransportError::Request { message }
        }
    }

}
