//! Worker lifecycle: install-time precache and the activation sweep.

use std::sync::Arc;

use tracing::{debug, info, warn};

use glidepath_net::{Origin, Request};
use glidepath_store::{CacheKey, CacheStorage, StoreError};

use crate::config::WorkerConfig;
use crate::{WorkerError, WorkerResult};

/// Lifecycle states of a cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, nothing installed yet.
    New,
    /// Install event running; the precache is in flight.
    Installing,
    /// Precache committed; waiting to take over.
    Installed,
    /// Activate event running; stale generations are being swept.
    Activating,
    /// Controlling the origin; the current generation serves requests.
    Activated,
    /// Install failed; this worker will never serve.
    Redundant,
}

/// What the activation sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Stale generations that were removed.
    pub deleted: Vec<String>,
    /// Generations that could not be removed, with the refusal.
    pub failed: Vec<(String, StoreError)>,
}

impl SweepReport {
    /// Check that nothing was left behind.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch every manifest path, then commit the set as one bulk write.
///
/// A failed fetch, a non-2xx answer, or a refused commit aborts the
/// install with nothing stored. A generation created by this attempt is
/// rolled back; entries of a pre-existing generation are never touched.
pub(crate) async fn precache(
    origin: &Arc<dyn Origin>,
    storage: &CacheStorage,
    config: &WorkerConfig,
) -> WorkerResult<()> {
    let name = config.cache_name();
    let mut batch = Vec::with_capacity(config.precache.len());

    for path in &config.precache {
        let url = config.resolve(path)?;
        let request = Request::get(url.clone());
        let key = CacheKey::of(&request);
        let response = origin
            .fetch(request)
            .await
            .map_err(|e| WorkerError::Precache {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !response.ok() {
            return Err(WorkerError::Precache {
                url,
                reason: format!("status {}", response.status),
            });
        }
        debug!(url = %key.url, bytes = response.body.len(), "Fetched manifest entry");
        batch.push((key, response));
    }

    let created = !storage.contains(name).await;
    let cache = storage.open(name).await;
    if let Err(error) = cache.put_many(batch).await {
        warn!(generation = name, %error, "Precache commit refused");
        if created {
            // Leave no half-made generation behind.
            let _ = storage.delete_generation(name).await;
        }
        return Err(error.into());
    }

    info!(
        generation = name,
        entries = config.precache.len(),
        "Precache complete"
    );
    Ok(())
}

/// Remove every generation except `keep`.
///
/// Failures are collected rather than fatal.
pub(crate) async fn sweep(storage: &CacheStorage, keep: &str) -> SweepReport {
    let mut report = SweepReport::default();
    for name in storage.generation_names().await {
        if name == keep {
            continue;
        }
        match storage.delete_generation(&name).await {
            Ok(_) => {
                info!(generation = %name, "Removed stale generation");
                report.deleted.push(name);
            }
            Err(error) => {
                warn!(generation = %name, %error, "Could not remove stale generation");
                report.failed.push((name, error));
            }
        }
    }
    report
}
