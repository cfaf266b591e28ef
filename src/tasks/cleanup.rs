//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries so that
//! keys nobody reads again do not linger until restart.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Cache;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task runs until aborted; the returned handle is used for that during
/// graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Cache::local();
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(300));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Cache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiry sweep on {} backend every {:?}",
            cache.backend_name(),
            interval
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;

            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
