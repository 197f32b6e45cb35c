//! # Glidepath Common
//!
//! Shared plumbing for the Glidepath cache engine: logging setup and the
//! detached-task helper used for fire-and-forget background work.

pub mod logging;
pub mod task;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use task::detach;
