//! # Glidepath
//!
//! Offline-first HTTP cache worker for server-rendered web apps, built
//! around versioned cache generations and per-route fetch strategies.
//!
//! ## Architecture
//!
//! ```text
//!  host events                         CacheWorker
//!  ───────────                         ───────────
//!  install ─────────────► precache the manifest into one generation
//!  activate ────────────► sweep stale generations, claim open pages
//!  fetch(request) ──────► route the request:
//!                           navigation   ─► network first, offline fallback
//!                           static asset ─► cache first, detached revalidate
//!                           bypass, non-GET ─► declined (host default fetch)
//!                           other GET    ─► network passthrough
//!  message(json) ───────► SKIP_WAITING forces immediate activation
//! ```
//!
//! The worker owns no sockets and no event loop. A host embeds it, feeds
//! it lifecycle and fetch events, and performs its own default fetch
//! whenever the worker declines a request.

use thiserror::Error;
use url::Url;

pub mod clients;
pub mod config;
pub mod control;
pub mod lifecycle;
pub mod routes;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use clients::{Client, ClientId, Clients};
pub use config::WorkerConfig;
pub use control::ControlMessage;
pub use lifecycle::{SweepReport, WorkerState};
pub use routes::{RequestClass, Route};
pub use worker::{CacheWorker, FetchEvent, FetchOutcome};

pub use glidepath_net::{
    FetchError, HttpOrigin, Origin, OriginConfig, Request, RequestMode, Response,
};
pub use glidepath_store::{CacheHandle, CacheKey, CacheStorage, StoreConfig, StoreError};

/// Errors surfaced by the cache worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: WorkerState,
    },

    #[error("Precache of {url} failed: {reason}")]
    Precache { url: Url, reason: String },

    #[error("Network error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
