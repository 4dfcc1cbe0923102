use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::filters::window_cutoff;
use crate::services::store::{CandidateStore, StoreError};

/// Periodic store maintenance
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub interval: std::time::Duration,
    /// Pending rows older than this are flipped to expired
    pub window: Duration,
    /// Rows older than this are deleted; `None` keeps everything
    pub retention: Option<Duration>,
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    pub purged: u64,
}

/// Run a single expiry/retention sweep
pub async fn sweep(store: &dyn CandidateStore, policy: &CleanupPolicy) -> Result<SweepReport, StoreError> {
    let now = Utc::now();
    let expired = store.expire_before(window_cutoff(now, policy.window)).await?;
    let purged = match policy.retention {
        Some(retention) => store.purge_before(now - retention).await?,
        None => 0,
    };
    Ok(SweepReport { expired, purged })
}

/// Spawn the cleanup loop on the current runtime
///
/// Sweep failures are logged and retried on the next tick.
pub fn spawn_cleanup(store: Arc<dyn CandidateStore>, policy: CleanupPolicy) -> JoinHandle<()> {
    tracing::info!(
        "Setting up candidate cleanup every {}s",
        policy.interval.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let started = std::time::Instant::now();
            match sweep(store.as_ref(), &policy).await {
                Ok(report) => tracing::info!(
                    "Candidate cleanup completed in {}ms: {} expired, {} purged",
                    started.elapsed().as_millis(),
                    report.expired,
                    report.purged
                ),
                Err(e) => tracing::error!("Candidate cleanup failed: {}", e),
            }
        }
    })
}
