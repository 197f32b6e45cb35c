//! Detached background tasks.
//!
//! Cache refreshes and write-behind stores run after the requester has
//! already been answered, so their outcome can only be reported to the
//! log. `detach` spawns such work on the runtime and logs how it ended.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn `work` without tying it to the caller's completion.
///
/// The spawned future owns everything it needs. Failures are logged at
/// `warn` under `label`, never surfaced to the caller. The returned handle
/// can be awaited by tests; production callers drop it.
pub fn detach<F, E>(label: &'static str, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display,
{
    tokio::spawn(async move {
        match work.await {
            Ok(()) => debug!(task = label, "background task finished"),
            Err(error) => warn!(task = label, error = %error, "background task failed"),
        }
    })
}
