//! Update Check Task
//!
//! Background task that periodically lets a waiting worker take over and
//! refreshes the current generation in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::worker::{RefreshOutcome, ServiceWorker};

/// Spawns a background task that checks for updates every `interval_secs`.
///
/// Each round first activates the worker if it is waiting and no page is
/// connected, then runs a refresh (coalesced with any refresh a page already
/// started).
///
/// # Returns
/// `None` when `interval_secs` is 0. Otherwise a JoinHandle for the spawned
/// task, which can be used to abort the task during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_update_check_task(worker.clone(), 3600);
/// // Later, during shutdown:
/// if let Some(handle) = handle { handle.abort(); }
/// ```
pub fn spawn_update_check_task(
    worker: Arc<ServiceWorker>,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        debug!("Update check task disabled");
        return None;
    }
    let interval = Duration::from_secs(interval_secs);

    Some(tokio::spawn(async move {
        info!(
            "Starting update check task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match worker.activate_if_idle().await {
                Ok(true) => info!("Update check: waiting worker activated"),
                Ok(false) => {}
                Err(err) => warn!("Update check: activation failed: {}", err),
            }

            match worker.refresh().await {
                Ok(RefreshOutcome::Completed(report)) => debug!(
                    "Update check: refreshed {} assets in '{}'",
                    report.refreshed, report.generation
                ),
                Ok(RefreshOutcome::Coalesced(_)) => {
                    debug!("Update check: joined a refresh already running")
                }
                Err(err) => warn!("Update check: refresh failed: {}", err),
            }
        }
    }))
}
