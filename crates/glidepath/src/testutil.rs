//! Test doubles shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use url::Url;

use glidepath_net::{FetchError, Origin, Request, Response};

use crate::config::WorkerConfig;

/// Scripted origin.
///
/// Each URL carries a queue of outcomes; a fetch pops the front of its
/// queue, and an unscripted fetch fails as a transport error.
pub(crate) struct FakeOrigin {
    script: Mutex<HashMap<String, VecDeque<Result<Response, FetchError>>>>,
    seen: Mutex<Vec<String>>,
}

impl FakeOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, url: &str, outcome: Result<Response, FetchError>) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue a 200 response for `url`.
    pub fn ok(&self, url: &str, body: &str) {
        self.push(url, Ok(html_response(url, StatusCode::OK, body)));
    }

    /// Queue a response with an explicit status code.
    pub fn status(&self, url: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.push(url, Ok(html_response(url, status, body)));
    }

    /// Queue a transport failure for `url`.
    pub fn fail(&self, url: &str) {
        self.push(
            url,
            Err(FetchError::Transport("connection refused".to_string())),
        );
    }

    /// Queue a 200 for every manifest path; each body is the path itself.
    pub fn ok_manifest(&self, config: &WorkerConfig) {
        self.ok_manifest_except(config, "");
    }

    /// Queue the manifest like [`ok_manifest`], leaving `broken` unscripted.
    ///
    /// [`ok_manifest`]: FakeOrigin::ok_manifest
    pub fn ok_manifest_except(&self, config: &WorkerConfig, broken: &str) {
        for path in &config.precache {
            if path == broken {
                continue;
            }
            let url = config.resolve(path).unwrap();
            self.ok(url.as_str(), path);
        }
    }

    /// URLs fetched so far, in arrival order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Origin for FakeOrigin {
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, FetchError>> {
        let url = request.url.to_string();
        self.seen.lock().unwrap().push(url.clone());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(FetchError::Transport(format!("no script for {url}"))));
        Box::pin(async move { outcome })
    }
}

/// Build an HTML response snapshot for tests.
pub(crate) fn html_response(url: &str, status: StatusCode, body: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Response::new(
        Url::parse(url).unwrap(),
        status,
        headers,
        Bytes::from(body.to_string()),
    )
}
