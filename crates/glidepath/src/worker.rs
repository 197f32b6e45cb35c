//! The cache worker facade.
//!
//! `CacheWorker` ties the pieces together: the host hands it lifecycle
//! events, fetch events, and page messages, and the worker answers with
//! outcomes. It owns no event loop; every entry point is a plain async
//! call the host can drive however it likes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use glidepath_net::{Origin, Request, Response};
use glidepath_store::{CacheHandle, CacheKey, CacheStorage};

use crate::clients::{ClientId, Clients};
use crate::config::WorkerConfig;
use crate::control::ControlMessage;
use crate::lifecycle::{self, SweepReport, WorkerState};
use crate::routes::{self, Route};
use crate::strategy;
use crate::{WorkerError, WorkerResult};

/// An intercepted request, with the page it came from when known.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub request: Request,
    pub client_id: Option<ClientId>,
}

impl FetchEvent {
    /// Event for a request with no attributed page.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
        }
    }

    /// Event for a request coming from a known page.
    pub fn from_client(request: Request, client_id: ClientId) -> Self {
        Self {
            request,
            client_id: Some(client_id),
        }
    }
}

/// What the worker decided for an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs its default fetch.
    Declined,
    /// Response produced by the worker, from network, cache, or fallback.
    Respond(Response),
}

impl FetchOutcome {
    pub fn is_declined(&self) -> bool {
        matches!(self, FetchOutcome::Declined)
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Declined => None,
            FetchOutcome::Respond(response) => Some(response),
        }
    }
}

/// An embeddable offline cache worker.
pub struct CacheWorker {
    config: WorkerConfig,
    origin: Arc<dyn Origin>,
    storage: CacheStorage,
    clients: Clients,
    state: RwLock<WorkerState>,
    skip_requested: AtomicBool,
}

impl CacheWorker {
    /// Create a worker with its own empty storage.
    pub fn new(config: WorkerConfig, origin: Arc<dyn Origin>) -> WorkerResult<Self> {
        Self::with_storage(config, origin, CacheStorage::default())
    }

    /// Create a worker over existing storage.
    ///
    /// This is how a new version starts next to the generations an older
    /// version left behind.
    pub fn with_storage(
        config: WorkerConfig,
        origin: Arc<dyn Origin>,
        storage: CacheStorage,
    ) -> WorkerResult<Self> {
        config.validate()?;
        info!(
            generation = config.cache_name(),
            scope = %config.scope,
            "Cache worker created"
        );
        Ok(Self {
            config,
            origin,
            storage,
            clients: Clients::new(),
            state: RwLock::new(WorkerState::New),
            skip_requested: AtomicBool::new(false),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The worker's configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Registry of open pages.
    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// The storage area behind this worker.
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Whether install asked the host to activate without waiting.
    pub fn wants_immediate_activation(&self) -> bool {
        self.skip_requested.load(Ordering::Relaxed)
    }

    /// Handle the host's install event: precache the manifest.
    ///
    /// On success the worker is `Installed` and requests immediate
    /// activation. On failure it is `Redundant` and the store holds
    /// nothing from this attempt.
    pub async fn install(&self) -> WorkerResult<()> {
        self.transition("install", WorkerState::New, WorkerState::Installing)
            .await?;
        info!(generation = self.config.cache_name(), "Installing");

        match lifecycle::precache(&self.origin, &self.storage, &self.config).await {
            Ok(()) => {
                self.skip_requested.store(true, Ordering::Relaxed);
                self.set_state(WorkerState::Installed).await;
                info!("Install complete, immediate activation requested");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(err)
            }
        }
    }

    /// Handle the host's activate event: sweep stale generations, then
    /// claim every open page.
    pub async fn activate(&self) -> WorkerResult<SweepReport> {
        self.transition("activate", WorkerState::Installed, WorkerState::Activating)
            .await?;

        let report = lifecycle::sweep(&self.storage, self.config.cache_name()).await;
        let claimed = self.clients.claim_all(self.config.cache_name()).await;
        self.set_state(WorkerState::Activated).await;

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed,
            "Activated"
        );
        Ok(report)
    }

    /// Request activation without waiting for pages to close.
    ///
    /// Records the request always; when the worker is currently waiting
    /// in `Installed` it activates right away and returns the sweep
    /// report.
    pub async fn skip_waiting(&self) -> WorkerResult<Option<SweepReport>> {
        self.skip_requested.store(true, Ordering::Relaxed);
        if self.state().await == WorkerState::Installed {
            return self.activate().await.map(Some);
        }
        Ok(None)
    }

    /// Handle a message envelope posted by a page.
    ///
    /// Unrecognized messages are dropped. Hosts that need the sweep
    /// report call [`skip_waiting`] directly.
    ///
    /// [`skip_waiting`]: CacheWorker::skip_waiting
    pub async fn handle_message(&self, raw: &str) {
        if let Some(ControlMessage::SkipWaiting) = ControlMessage::parse(raw) {
            debug!("SKIP_WAITING received");
            if let Err(error) = self.skip_waiting().await {
                warn!(%error, "Skip-waiting activation failed");
            }
        }
    }

    /// Decide and serve one intercepted request.
    pub async fn handle_fetch(&self, event: FetchEvent) -> WorkerResult<FetchOutcome> {
        let FetchEvent { request, client_id } = event;
        let decision = routes::route(&request, &self.config);
        debug!(
            method = %request.method,
            url = %request.url,
            client = ?client_id.map(|c| c.raw()),
            route = ?decision,
            "Fetch event"
        );

        match decision {
            Route::Decline => Ok(FetchOutcome::Declined),
            Route::NetworkFirst => {
                let cache = self.current_cache().await;
                let offline_key = self.offline_key()?;
                let response =
                    strategy::network_first(&self.origin, cache, &offline_key, request).await?;
                Ok(FetchOutcome::Respond(response))
            }
            Route::CacheFirst => {
                let cache = self.current_cache().await;
                let response = strategy::cache_first(&self.origin, cache, request).await?;
                Ok(FetchOutcome::Respond(response))
            }
            Route::NetworkOnly => {
                let response = strategy::network_only(&self.origin, request).await?;
                Ok(FetchOutcome::Respond(response))
            }
        }
    }

    async fn current_cache(&self) -> CacheHandle {
        self.storage.open(self.config.cache_name()).await
    }

    fn offline_key(&self) -> WorkerResult<CacheKey> {
        Ok(CacheKey::get(self.config.resolve(&self.config.offline_path)?))
    }

    /// Atomically step from `from` to `to`, refusing any other start state.
    async fn transition(
        &self,
        op: &'static str,
        from: WorkerState,
        to: WorkerState,
    ) -> WorkerResult<()> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(WorkerError::InvalidState { op, state: *state });
        }
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: WorkerState) {
        *self.state.write().await = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeOrigin;
    use http::Method;
    use std::time::Duration;
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse(&format!("http://localhost:4000{path}")).unwrap()
    }

    fn worker_over(fake: &Arc<FakeOrigin>) -> CacheWorker {
        CacheWorker::new(WorkerConfig::default(), Arc::clone(fake) as Arc<dyn Origin>).unwrap()
    }

    async fn installed_worker() -> (Arc<FakeOrigin>, CacheWorker) {
        let fake = FakeOrigin::new();
        fake.ok_manifest(&WorkerConfig::default());
        let worker = worker_over(&fake);
        worker.install().await.unwrap();
        (fake, worker)
    }

    async fn activated_worker() -> (Arc<FakeOrigin>, CacheWorker) {
        let (fake, worker) = installed_worker().await;
        worker.activate().await.unwrap();
        (fake, worker)
    }

    async fn current_cache(worker: &CacheWorker) -> CacheHandle {
        worker.storage().open(worker.config().cache_name()).await
    }

    /// Poll until `key` holds `body` in the worker's current generation.
    async fn eventually_holds(worker: &CacheWorker, key: &CacheKey, body: &[u8]) -> bool {
        let cache = current_cache(worker).await;
        for _ in 0..200 {
            if let Some(response) = cache.match_key(key).await {
                if response.body.as_ref() == body {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_new_worker_starts_fresh() {
        let fake = FakeOrigin::new();
        let worker = worker_over(&fake);
        assert_eq!(worker.state().await, WorkerState::New);
        assert!(!worker.wants_immediate_activation());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let fake = FakeOrigin::new();
        let config = WorkerConfig {
            cache_version: String::new(),
            ..Default::default()
        };
        let result = CacheWorker::new(config, Arc::clone(&fake) as Arc<dyn Origin>);
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }

    #[tokio::test]
    async fn test_install_then_activate_flow() {
        let (_fake, worker) = installed_worker().await;
        assert_eq!(worker.state().await, WorkerState::Installed);
        assert!(worker.wants_immediate_activation());

        let report = worker.activate().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Activated);
        assert!(report.is_clean());

        let cache = current_cache(&worker).await;
        assert_eq!(cache.len().await, worker.config().precache.len());
    }

    #[tokio::test]
    async fn test_install_failure_marks_worker_redundant() {
        // Nothing scripted, so the first manifest fetch fails.
        let fake = FakeOrigin::new();
        let worker = worker_over(&fake);

        let result = worker.install().await;

        assert!(matches!(result, Err(WorkerError::Precache { .. })));
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert!(!worker.storage().contains(worker.config().cache_name()).await);
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let (_fake, worker) = installed_worker().await;
        let result = worker.install().await;
        assert!(matches!(
            result,
            Err(WorkerError::InvalidState { op: "install", .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_requires_installed() {
        let fake = FakeOrigin::new();
        let worker = worker_over(&fake);
        let result = worker.activate().await;
        assert!(matches!(
            result,
            Err(WorkerError::InvalidState {
                op: "activate",
                state: WorkerState::New
            })
        ));
    }

    #[tokio::test]
    async fn test_activate_leaves_a_single_generation() {
        let fake = FakeOrigin::new();
        fake.ok_manifest(&WorkerConfig::default());
        let storage = CacheStorage::default();
        storage.open("flightlog-v0").await;
        storage.open("legacy-assets").await;

        let worker = CacheWorker::with_storage(
            WorkerConfig::default(),
            Arc::clone(&fake) as Arc<dyn Origin>,
            storage,
        )
        .unwrap();
        worker.install().await.unwrap();
        let report = worker.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["flightlog-v0", "legacy-assets"]);
        assert_eq!(
            worker.storage().generation_names().await,
            vec!["flightlog-v1"]
        );
    }

    #[tokio::test]
    async fn test_activate_claims_open_pages() {
        let (_fake, worker) = installed_worker().await;
        worker.clients().add(url("/")).await;
        worker.clients().add(url("/flights")).await;

        worker.activate().await.unwrap();

        assert_eq!(worker.clients().controlled_by("flightlog-v1").await, 2);
    }

    #[tokio::test]
    async fn test_navigation_is_served_from_network() {
        let (fake, worker) = activated_worker().await;
        fake.ok("http://localhost:4000/flights", "<html>flights</html>");

        let outcome = worker
            .handle_fetch(FetchEvent::new(Request::navigate(url("/flights"))))
            .await
            .unwrap();

        let response = outcome.into_response().unwrap();
        assert_eq!(response.body.as_ref(), b"<html>flights</html>");

        let key = CacheKey::get(url("/flights"));
        assert!(eventually_holds(&worker, &key, b"<html>flights</html>").await);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_precached_document() {
        let (fake, worker) = activated_worker().await;
        fake.fail("http://localhost:4000/flights");

        let outcome = worker
            .handle_fetch(FetchEvent::new(Request::navigate(url("/flights"))))
            .await
            .unwrap();

        // Byte-for-byte the precached offline document.
        let cache = current_cache(&worker).await;
        let stored = cache
            .match_key(&CacheKey::get(url("/offline.html")))
            .await
            .unwrap();
        let response = outcome.into_response().unwrap();
        assert_eq!(response.body, stored.body);
    }

    #[tokio::test]
    async fn test_navigation_failure_without_install_propagates() {
        let fake = FakeOrigin::new();
        let worker = worker_over(&fake);
        fake.fail("http://localhost:4000/flights");

        let result = worker
            .handle_fetch(FetchEvent::new(Request::navigate(url("/flights"))))
            .await;

        assert!(matches!(result, Err(WorkerError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_warm_asset_is_served_stale_then_refreshed() {
        let (fake, worker) = activated_worker().await;
        fake.ok("http://localhost:4000/assets/app.css", "refreshed");

        let outcome = worker
            .handle_fetch(FetchEvent::new(Request::get(url("/assets/app.css"))))
            .await
            .unwrap();

        // Precached body first, refreshed copy once revalidation lands.
        let response = outcome.into_response().unwrap();
        assert_eq!(response.body.as_ref(), b"/assets/app.css");

        let key = CacheKey::get(url("/assets/app.css"));
        assert!(eventually_holds(&worker, &key, b"refreshed").await);
    }

    #[tokio::test]
    async fn test_bypass_and_non_get_are_declined_without_fetching() {
        let (fake, worker) = activated_worker().await;
        let manifest_fetches = fake.seen().len();

        let live = worker
            .handle_fetch(FetchEvent::new(Request::get(url("/live/websocket"))))
            .await
            .unwrap();
        let post = worker
            .handle_fetch(FetchEvent::new(
                Request::get(url("/api/flights")).method(Method::POST),
            ))
            .await
            .unwrap();

        assert!(live.is_declined());
        assert!(post.is_declined());
        // Declined requests never reach the origin.
        assert_eq!(fake.seen().len(), manifest_fetches);
    }

    #[tokio::test]
    async fn test_api_get_passes_through_uncached() {
        let (fake, worker) = activated_worker().await;
        fake.status("http://localhost:4000/api/flights", 200, "[]");

        let outcome = worker
            .handle_fetch(FetchEvent::new(Request::get(url("/api/flights"))))
            .await
            .unwrap();

        assert_eq!(outcome.into_response().unwrap().body.as_ref(), b"[]");
        // Passthrough traffic leaves the generation untouched.
        let cache = current_cache(&worker).await;
        assert_eq!(cache.len().await, worker.config().precache.len());
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_a_waiting_worker() {
        let (_fake, worker) = installed_worker().await;
        worker.clients().add(url("/")).await;
        assert_eq!(worker.state().await, WorkerState::Installed);

        worker.handle_message(r#"{"type": "SKIP_WAITING"}"#).await;

        assert_eq!(worker.state().await, WorkerState::Activated);
        assert_eq!(worker.clients().controlled_by("flightlog-v1").await, 1);
    }

    #[tokio::test]
    async fn test_unknown_messages_change_nothing() {
        let (_fake, worker) = installed_worker().await;

        worker.handle_message("not json").await;
        worker.handle_message(r#"{"type": "CLEAR_ALL"}"#).await;

        assert_eq!(worker.state().await, WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install_only_records() {
        let fake = FakeOrigin::new();
        let worker = worker_over(&fake);

        let report = worker.skip_waiting().await.unwrap();

        assert!(report.is_none());
        assert!(worker.wants_immediate_activation());
        assert_eq!(worker.state().await, WorkerState::New);
    }
}
