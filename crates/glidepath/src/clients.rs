//! Open pages and the adoption step of activation.
//!
//! A client is one open page on the origin. Pages start uncontrolled;
//! activation claims them all at once so a fresh worker takes effect
//! without waiting for reloads.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Unique identifier for a client page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A page currently open against the origin.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: ClientId,

    /// Page URL.
    pub url: Url,

    /// Cache version controlling this page, if any.
    pub controller: Option<String>,
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page, initially uncontrolled. Returns its id.
    pub async fn add(&self, url: Url) -> ClientId {
        let id = ClientId::next();
        let client = Client {
            id,
            url,
            controller: None,
        };
        self.clients.write().await.insert(id, client);
        id
    }

    /// Remove a page, returning its final record.
    pub async fn remove(&self, id: ClientId) -> Option<Client> {
        self.clients.write().await.remove(&id)
    }

    /// Look up a page.
    pub async fn get(&self, id: ClientId) -> Option<Client> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Number of open pages.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Check if no pages are open.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Put every open page under `version`, reload or not.
    ///
    /// Returns how many pages changed controller.
    pub async fn claim_all(&self, version: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        debug!(version, claimed, total = clients.len(), "Claimed open pages");
        claimed
    }

    /// Number of pages controlled by `version`.
    pub async fn controlled_by(&self, version: &str) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.controller.as_deref() == Some(version))
            .count()
    }
}
