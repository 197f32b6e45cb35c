//! Control channel messages from the hosting page.
//!
//! Pages talk to the worker with small JSON envelopes shaped like
//! `{"type": "SKIP_WAITING"}`. Unknown or malformed envelopes are
//! ignored so that page and worker can be deployed independently.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Commands a hosting page may send to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Ask a waiting worker to activate without the page closing first.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    /// Parse a message envelope, ignoring anything unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(error) => {
                trace!(%error, "Ignoring unrecognized control message");
                None
            }
        }
    }
}
