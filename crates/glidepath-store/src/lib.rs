//! # Glidepath Store
//!
//! Versioned in-memory response cache for the Glidepath engine.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage ─── open("flightlog-v1") ───► CacheHandle
//!      │                                          │
//!      │  generations: name → entry map           │  match_key / put / put_many
//!      │  quota accounting across generations     ▼
//!      └────────────────────────────► CacheKey (method + URL) → Response
//! ```
//!
//! A generation is one named set of response snapshots. The engine keeps
//! exactly one generation current and sweeps the rest during activation.
//! Handles are scoped: a `CacheHandle` reaches only the generation it was
//! opened for, so cross-version reads cannot happen by accident.
//!
//! The store never inspects status codes. Deciding what is worth caching
//! is the caller's policy; the store only enforces the byte quota.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use http::Method;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use glidepath_net::{Request, Response};

// ==================== Errors ====================

/// Errors that can occur in cache storage.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The write would push the storage area past its byte quota.
    #[error("Quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },
}

// ==================== Keys ====================

/// Identity of a cached response: method plus absolute URL.
///
/// Query strings distinguish keys; fragments were already stripped by the
/// URL parser before a request reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: Url,
}

impl CacheKey {
    /// Key under which `request` would be cached.
    pub fn of(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
        }
    }

    /// Key for a plain GET of `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }

    fn size(&self) -> u64 {
        (self.method.as_str().len() + self.url.as_str().len()) as u64
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Entries ====================

/// A stored response snapshot.
#[derive(Debug, Clone)]
struct StoredEntry {
    response: Response,
    /// Accounted size, fixed at insertion time.
    size: u64,
    /// Stored-at timestamp (ms since epoch).
    cached_at: u64,
}

impl StoredEntry {
    fn new(response: Response, size: u64) -> Self {
        Self {
            response,
            size,
            cached_at: now_ms(),
        }
    }
}

/// Accounted size of one entry: key text, header text, and body bytes.
fn entry_size(key: &CacheKey, response: &Response) -> u64 {
    let header_bytes: u64 = response
        .headers
        .iter()
        .map(|(name, value)| (name.as_str().len() + value.len()) as u64)
        .sum();
    key.size() + header_bytes + response.body.len() as u64
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==================== Generations ====================

#[derive(Debug)]
struct Generation {
    name: String,
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
}

impl Generation {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

// ==================== Storage ====================

/// Storage tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreConfig {
    /// Byte budget across all generations. `None` means unlimited.
    pub quota_bytes: Option<u64>,
}

#[derive(Debug)]
struct StorageInner {
    generations: RwLock<HashMap<String, Arc<Generation>>>,
    used_bytes: AtomicU64,
    quota_bytes: Option<u64>,
}

impl StorageInner {
    /// Account `bytes` toward the quota, refusing the write if it cannot fit.
    fn reserve(&self, bytes: u64) -> Result<(), StoreError> {
        match self.quota_bytes {
            None => {
                self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
                Ok(())
            }
            Some(limit) => {
                let updated =
                    self.used_bytes
                        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                            used.checked_add(bytes).filter(|&total| total <= limit)
                        });
                match updated {
                    Ok(_) => Ok(()),
                    Err(used) => Err(StoreError::QuotaExceeded {
                        needed: bytes,
                        available: limit.saturating_sub(used),
                    }),
                }
            }
        }
    }

    fn release(&self, bytes: u64) {
        self.used_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }
}

/// Shared storage area holding every cache generation.
///
/// Cloning is cheap and clones share state, so one storage can serve many
/// concurrent request handlers.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    inner: Arc<StorageInner>,
}

impl CacheStorage {
    /// Create a storage area with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                generations: RwLock::new(HashMap::new()),
                used_bytes: AtomicU64::new(0),
                quota_bytes: config.quota_bytes,
            }),
        }
    }

    /// Open a generation, creating it if it does not exist.
    pub async fn open(&self, name: &str) -> CacheHandle {
        let mut generations = self.inner.generations.write().await;
        let generation = generations
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(generation = name, "Created cache generation");
                Arc::new(Generation::new(name))
            });
        CacheHandle {
            generation: Arc::clone(generation),
            storage: Arc::clone(&self.inner),
        }
    }

    /// Check if a generation exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.inner.generations.read().await.contains_key(name)
    }

    /// All generation names, sorted for stable iteration.
    pub async fn generation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .generations
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Delete a generation, returning whether it existed.
    ///
    /// Live handles to the deleted generation keep working; its entries
    /// simply stop being listed here.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.inner.generations.write().await.remove(name);
        match removed {
            Some(generation) => {
                let freed: u64 = generation
                    .entries
                    .read()
                    .await
                    .values()
                    .map(|e| e.size)
                    .sum();
                self.inner.release(freed);
                debug!(generation = name, freed_bytes = freed, "Deleted cache generation");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bytes currently accounted against the quota.
    pub fn used_bytes(&self) -> u64 {
        self.inner.used_bytes.load(Ordering::Relaxed)
    }

    /// Configured byte budget, if any.
    pub fn quota_bytes(&self) -> Option<u64> {
        self.inner.quota_bytes
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

// ==================== Handles ====================

/// A handle scoped to one cache generation.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    generation: Arc<Generation>,
    storage: Arc<StorageInner>,
}

impl CacheHandle {
    /// Name of the generation this handle reaches.
    pub fn name(&self) -> &str {
        &self.generation.name
    }

    /// Look up the stored response for `key`.
    pub async fn match_key(&self, key: &CacheKey) -> Option<Response> {
        let entries = self.generation.entries.read().await;
        match entries.get(key) {
            Some(entry) => {
                trace!(generation = %self.generation.name, key = %key, age_ms = now_ms().saturating_sub(entry.cached_at), "Cache hit");
                Some(entry.response.clone())
            }
            None => {
                trace!(generation = %self.generation.name, key = %key, "Cache miss");
                None
            }
        }
    }

    /// Store one response under `key`, replacing any previous entry.
    pub async fn put(&self, key: CacheKey, response: Response) -> Result<(), StoreError> {
        let size = entry_size(&key, &response);
        let mut entries = self.generation.entries.write().await;
        let replaced = entries.get(&key).map(|e| e.size).unwrap_or(0);

        if size > replaced {
            self.storage.reserve(size - replaced)?;
        } else {
            self.storage.release(replaced - size);
        }

        trace!(generation = %self.generation.name, key = %key, bytes = size, "Stored entry");
        entries.insert(key, StoredEntry::new(response, size));
        Ok(())
    }

    /// Store a batch of responses in one commit.
    ///
    /// Either every entry lands or none does; a quota refusal leaves the
    /// generation exactly as it was.
    pub async fn put_many(
        &self,
        batch: Vec<(CacheKey, Response)>,
    ) -> Result<(), StoreError> {
        let mut staged: HashMap<CacheKey, StoredEntry> = HashMap::with_capacity(batch.len());
        for (key, response) in batch {
            let size = entry_size(&key, &response);
            staged.insert(key, StoredEntry::new(response, size));
        }

        let mut entries = self.generation.entries.write().await;
        let incoming: u64 = staged.values().map(|e| e.size).sum();
        let replaced: u64 = staged
            .keys()
            .filter_map(|key| entries.get(key).map(|e| e.size))
            .sum();

        if incoming > replaced {
            self.storage.reserve(incoming - replaced)?;
        } else {
            self.storage.release(replaced - incoming);
        }

        let count = staged.len();
        for (key, entry) in staged {
            entries.insert(key, entry);
        }
        debug!(generation = %self.generation.name, entries = count, bytes = incoming, "Bulk store committed");
        Ok(())
    }

    /// Remove one entry, returning whether it existed.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let mut entries = self.generation.entries.write().await;
        match entries.remove(key) {
            Some(entry) => {
                self.storage.release(entry.size);
                true
            }
            None => false,
        }
    }

    /// All keys in this generation.
    pub async fn keys(&self) -> Vec<CacheKey> {
        self.generation.entries.read().await.keys().cloned().collect()
    }

    /// Number of entries in this generation.
    pub async fn len(&self) -> usize {
        self.generation.entries.read().await.len()
    }

    /// Check if this generation has no entries.
    pub async fn is_empty(&self) -> bool {
        self.generation.entries.read().await.is_empty()
    }
}
