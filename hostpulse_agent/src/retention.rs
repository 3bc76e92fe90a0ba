//! Periodic cleanup of samples older than the retention horizon.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::StoreResult;
use crate::store::SampleStore;

/// Delete every sample strictly older than `now - retention`.
pub async fn sweep(store: &SampleStore, retention: Duration) -> StoreResult<usize> {
    let horizon = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    match store.now().checked_sub_signed(horizon) {
        Some(cutoff) => store.delete_older_than(cutoff).await,
        // horizon reaches before the representable range; nothing is that old
        None => Ok(0),
    }
}

/// Run the retention loop until `cancel` is triggered. The first sweep runs
/// immediately.
pub async fn run_sweeper(
    store: SampleStore,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_hours = retention.as_secs() / 3600,
        interval_secs = every.as_secs(),
        "Retention sweeper started"
    );

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sweep(&store, retention).await {
            Ok(0) => tracing::debug!("Retention: no rows to purge"),
            Ok(deleted) => tracing::info!(deleted, "Retention: purged old samples"),
            Err(e) => tracing::error!(error = %e, "Retention: cleanup failed"),
        }
    }

    tracing::info!("Retention sweeper stopping");
}
