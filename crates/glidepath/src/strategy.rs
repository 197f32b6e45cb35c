//! Fetch strategies.
//!
//! Three policies cover every request the worker intercepts:
//!
//! - **Network first** (navigations): ask the origin, fall back to the
//!   precached offline document only when the transport fails.
//! - **Cache first** (static assets): serve cached bytes immediately and
//!   refresh the entry behind the response.
//! - **Network only** (everything else): plain passthrough.
//!
//! Only 2xx responses are ever written to a cache, and cache writes never
//! delay the requester: they run as detached tasks whose failures go to
//! the log.

use std::sync::Arc;

use tracing::{debug, warn};

use glidepath_common::task;
use glidepath_net::{FetchError, Origin, Request, Response};
use glidepath_store::{CacheHandle, CacheKey};

/// Serve a navigation: freshest page when the origin answers, the
/// offline document when it cannot be reached.
///
/// A non-2xx answer is passed through untouched; only a transport
/// failure triggers the fallback. If the offline document was never
/// precached the original failure is propagated.
pub async fn network_first(
    origin: &Arc<dyn Origin>,
    cache: CacheHandle,
    offline_key: &CacheKey,
    request: Request,
) -> Result<Response, FetchError> {
    let key = CacheKey::of(&request);
    match origin.fetch(request).await {
        Ok(response) => {
            if response.ok() {
                write_behind(cache, key, response.clone());
            }
            Ok(response)
        }
        Err(error) => {
            warn!(key = %key, %error, "Navigation fetch failed, serving offline document");
            match cache.match_key(offline_key).await {
                Some(offline) => Ok(offline),
                None => {
                    warn!(key = %offline_key, "Offline document not cached, propagating failure");
                    Err(error)
                }
            }
        }
    }
}

/// Serve a static asset: cached bytes immediately when warm, the network
/// when cold.
///
/// A warm hit schedules a detached [`revalidate`] so the entry tracks the
/// origin. A cold miss stores the fetched response before returning it;
/// a refused store is logged and the response served anyway.
pub async fn cache_first(
    origin: &Arc<dyn Origin>,
    cache: CacheHandle,
    request: Request,
) -> Result<Response, FetchError> {
    let key = CacheKey::of(&request);

    if let Some(cached) = cache.match_key(&key).await {
        debug!(key = %key, "Asset served from cache, revalidating behind the response");
        task::detach(
            "revalidate",
            revalidate(Arc::clone(origin), cache, key, request),
        );
        return Ok(cached);
    }

    debug!(key = %key, "Asset not cached, fetching from origin");
    let response = origin.fetch(request).await?;
    if response.ok() {
        if let Err(error) = cache.put(key.clone(), response.clone()).await {
            warn!(key = %key, %error, "Asset store refused, serving uncached");
        }
    }
    Ok(response)
}

/// Plain passthrough for requests with no caching policy.
pub async fn network_only(
    origin: &Arc<dyn Origin>,
    request: Request,
) -> Result<Response, FetchError> {
    origin.fetch(request).await
}

/// Refresh one cache entry from the origin.
///
/// Runs detached behind a warm cache hit. A non-2xx answer or a refused
/// store keeps the existing entry; only transport failures surface to
/// the task wrapper's log.
pub(crate) async fn revalidate(
    origin: Arc<dyn Origin>,
    cache: CacheHandle,
    key: CacheKey,
    request: Request,
) -> Result<(), FetchError> {
    let response = origin.fetch(request).await?;
    if !response.ok() {
        debug!(key = %key, status = %response.status, "Revalidation got non-success, keeping entry");
        return Ok(());
    }
    if let Err(error) = cache.put(key.clone(), response).await {
        warn!(key = %key, %error, "Revalidation store refused, keeping entry");
    }
    Ok(())
}

/// Queue a cache write behind the response path.
fn write_behind(cache: CacheHandle, key: CacheKey, response: Response) {
    task::detach("cache-write", async move { cache.put(key, response).await });
}
