//! reqwest-backed origin transport.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::{FetchError, Origin, Request, Response};

/// Origin transport configuration.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Total per-request timeout. `None` leaves timing to the transport
    /// and the server.
    pub timeout: Option<Duration>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            user_agent: "Glidepath/0.1".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: None,
        }
    }
}

/// Production [`Origin`] over a shared reqwest client.
pub struct HttpOrigin {
    client: reqwest::Client,
    config: OriginConfig,
}

impl HttpOrigin {
    /// Create an origin transport with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(OriginConfig::default())
    }

    /// Create an origin transport with the given configuration.
    pub fn with_config(config: OriginConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        debug!(user_agent = %config.user_agent, timeout = ?config.timeout, "HttpOrigin initialized");

        Ok(Self { client, config })
    }
}

impl Origin for HttpOrigin {
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, FetchError>> {
        Box::pin(async move {
            if !matches!(request.url.scheme(), "http" | "https") {
                return Err(FetchError::InvalidUrl(request.url.to_string()));
            }

            debug!(url = %request.url, method = %request.method, "Fetching from origin");

            let mut req_builder = self
                .client
                .request(request.method.clone(), request.url.clone());

            for (name, value) in request.headers.iter() {
                req_builder = req_builder.header(name, value);
            }

            req_builder = req_builder.header("Accept-Language", &self.config.accept_language);

            let response = req_builder.send().await.map_err(map_transport_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await.map_err(map_transport_error)?;

            trace!(
                url = %url,
                status = %status,
                body_len = body.len(),
                "Origin response received"
            );

            Ok(Response::new(url, status, headers, body))
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(error.to_string())
    }
}
