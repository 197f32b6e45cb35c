//! # Glidepath Net
//!
//! HTTP request/response model and origin transport for the Glidepath cache engine.
//!
//! ## Design Goals
//!
//! 1. **Snapshot bodies**: Response bodies are `Bytes`, so one response can be
//!    handed to the requester and written to a cache without copying
//! 2. **Transport errors only**: A reachable server's non-2xx answer is a
//!    `Response`, never a `FetchError`; caching policy depends on that split
//! 3. **Swappable transport**: Policy code fetches through `dyn Origin`, with
//!    `HttpOrigin` as the production implementation

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::string::FromUtf8Error;
use thiserror::Error;
use url::Url;

pub mod origin;

pub use origin::{HttpOrigin, OriginConfig};

/// Errors that can occur in the network transport.
///
/// A completed HTTP exchange is never an error here, whatever its status
/// code. These variants cover the cases where no response exists at all.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Client construction failed: {0}")]
    Client(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,
}

/// How a request enters the page, mirroring the fetch request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    /// Same-origin subresource.
    SameOrigin,
    /// Plain subresource fetch.
    #[default]
    NoCors,
    /// Cross-origin subresource with CORS checks.
    Cors,
}

/// An HTTP request as the cache engine intercepts it.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub mode: RequestMode,
    pub headers: HeaderMap,
}

impl Request {
    /// Create a GET subresource request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::NoCors,
            headers: HeaderMap::new(),
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check if this is a top-level document load.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// URL path component.
    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// A captured HTTP response: status, headers, and a body snapshot.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Build a response around a body snapshot.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }
}

/// The network transport that fetch policies run against.
///
/// `fetch` resolves to a `Response` for any completed exchange, non-2xx
/// statuses included, and errs only when the transport itself fails.
/// Implementations must tolerate concurrent in-flight requests.
pub trait Origin: Send + Sync {
    /// Perform `request` against the origin server.
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, FetchError>>;
}
