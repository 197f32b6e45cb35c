//! Request classification and routing.
//!
//! Classification is pure: method, mode, and path in, class out. Nothing
//! here touches the store or the network, which keeps the routing table
//! testable as a plain function.

use http::Method;

use glidepath_net::Request;

use crate::config::WorkerConfig;

/// What kind of request the worker is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Top-level document load.
    Navigation,
    /// Asset under a configured prefix, or the favicon.
    StaticAsset,
    /// Realtime or dev-reload channel the worker must not touch.
    Bypass,
    /// Any other GET, API calls included.
    Other,
}

/// How the worker serves a request class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host runs its default fetch.
    Decline,
    /// Freshest page when online, offline document when not.
    NetworkFirst,
    /// Cached bytes immediately, refresh behind the response.
    CacheFirst,
    /// Uncached passthrough fetch.
    NetworkOnly,
}

/// Classify a request by mode and path.
///
/// Bypass wins over everything else, so a navigation into a bypass
/// prefix still reaches the host untouched.
pub fn classify(request: &Request, config: &WorkerConfig) -> RequestClass {
    let path = request.path();
    if config
        .bypass_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return RequestClass::Bypass;
    }
    if request.is_navigation() {
        return RequestClass::Navigation;
    }
    if config
        .asset_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
        || path == config.favicon_path
    {
        return RequestClass::StaticAsset;
    }
    RequestClass::Other
}

/// Pick the route for a request. Non-GET methods are never intercepted.
pub fn route(request: &Request, config: &WorkerConfig) -> Route {
    if request.method != Method::GET {
        return Route::Decline;
    }
    match classify(request, config) {
        RequestClass::Bypass => Route::Decline,
        RequestClass::Navigation => Route::NetworkFirst,
        RequestClass::StaticAsset => Route::CacheFirst,
        RequestClass::Other => Route::NetworkOnly,
    }
}
