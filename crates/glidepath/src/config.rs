//! Worker configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{WorkerError, WorkerResult};

/// Cache worker configuration.
///
/// Every path is origin-relative and resolved against `scope`. The
/// defaults describe the FlightLog deployment this engine ships with;
/// hosts override them per app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin scope that configured paths resolve against.
    pub scope: Url,

    /// Cache version tag; also the name of the current generation.
    pub cache_version: String,

    /// Path of the offline fallback document. Must appear in `precache`.
    pub offline_path: String,

    /// Paths fetched and stored during install.
    pub precache: Vec<String>,

    /// Path prefixes served cache-first.
    pub asset_prefixes: Vec<String>,

    /// Exact favicon path, also served cache-first.
    pub favicon_path: String,

    /// Path prefixes the worker never intercepts.
    pub bypass_prefixes: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse("http://localhost:4000/").expect("default scope is a valid URL"),
            cache_version: "flightlog-v1".to_string(),
            offline_path: "/offline.html".to_string(),
            precache: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/assets/app.css".to_string(),
                "/assets/app.js".to_string(),
                "/images/logo.svg".to_string(),
                "/favicon.ico".to_string(),
            ],
            asset_prefixes: vec!["/assets/".to_string(), "/images/".to_string()],
            favicon_path: "/favicon.ico".to_string(),
            bypass_prefixes: vec![
                "/live".to_string(),
                "/phoenix/live_reload".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    /// Name of the cache generation this version writes to.
    pub fn cache_name(&self) -> &str {
        &self.cache_version
    }

    /// Resolve a configured path against the scope.
    pub fn resolve(&self, path: &str) -> WorkerResult<Url> {
        self.scope.join(path).map_err(|e| {
            WorkerError::Config(format!(
                "cannot resolve {path} against {}: {e}",
                self.scope
            ))
        })
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.cache_version.is_empty() {
            return Err(WorkerError::Config(
                "cache_version must not be empty".to_string(),
            ));
        }
        if self.scope.cannot_be_a_base() {
            return Err(WorkerError::Config(format!(
                "scope {} cannot serve as a base URL",
                self.scope
            )));
        }
        if self.precache.is_empty() {
            return Err(WorkerError::Config(
                "precache manifest must not be empty".to_string(),
            ));
        }
        if !self.precache.contains(&self.offline_path) {
            return Err(WorkerError::Config(format!(
                "offline document {} is missing from the precache manifest",
                self.offline_path
            )));
        }

        let all_paths = self
            .precache
            .iter()
            .chain(self.asset_prefixes.iter())
            .chain(self.bypass_prefixes.iter())
            .chain([&self.offline_path, &self.favicon_path]);
        for path in all_paths {
            if !path.starts_with('/') {
                return Err(WorkerError::Config(format!(
                    "path {path} must start with '/'"
                )));
            }
        }
        Ok(())
    }
}
