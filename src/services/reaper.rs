//! Periodic eviction of finished jobs.
//!
//! Completed and failed records are dropped once they have not changed for
//! the configured TTL. Queued and processing jobs are never touched.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::job_store::JobStore;

/// Run the eviction loop until `cancel` is triggered.
pub async fn run(store: Arc<JobStore>, ttl: Duration, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = every.as_secs(),
        "Job reaper started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job reaper stopping");
                break;
            }
            _ = interval.tick() => {
                let Ok(ttl) = chrono::Duration::from_std(ttl) else {
                    tracing::error!("Job TTL out of range, reaper disabled");
                    break;
                };
                let evicted = store.evict_terminal_older_than(Utc::now() - ttl);
                if evicted > 0 {
                    tracing::info!(evicted, "Evicted expired jobs");
                } else {
                    tracing::debug!("No expired jobs");
                }
            }
        }
    }
}
