//! Background sampler: on every interval collects a snapshot, appends it to
//! the history and pushes it to every live viewer.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::TickError;
use crate::metrics::collect_snapshot;
use crate::registry::BroadcastReport;
use crate::state::AppState;
use crate::types::{MetricsEvent, Sample};

/// What one successful tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    pub sample: Sample,
    pub broadcast: BroadcastReport,
}

/// Provider → alerts → store → broadcast. A store failure skips the broadcast.
pub async fn tick(state: &AppState) -> Result<TickOutcome, TickError> {
    let snapshot = collect_snapshot(&state.provider, &state.config.thresholds).await?;
    let sample = state.store.insert(snapshot.readings.clone()).await?;

    let json = serde_json::to_string(&MetricsEvent::new(snapshot, Utc::now()))?;
    *state.last_json.write().await = json.clone();
    let broadcast = state.registry.broadcast(&json).await;

    Ok(TickOutcome { sample, broadcast })
}

/// [`tick`] bounded by `limit`. On timeout the tick's outstanding provider or
/// store call is abandoned and the loop moves on.
pub async fn tick_within(state: &AppState, limit: Duration) -> Result<TickOutcome, TickError> {
    timeout(limit, tick(state))
        .await
        .map_err(|_| TickError::TimedOut(limit))?
}

/// Run until `cancel` fires. The token is checked before every tick and while
/// waiting for the next one, never in the middle of a tick. No tick outlives
/// one interval.
pub async fn run_sampler(state: AppState, cancel: CancellationToken) {
    let period = state.config.collection_interval;
    tracing::info!(interval_ms = period.as_millis() as u64, "Sampler started");

    let mut ticker = interval(period);
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

        match tick_within(&state, period).await {
            Ok(out) => {
                if out.broadcast.delivered > 0 || out.broadcast.dropped > 0 {
                    tracing::debug!(
                        sample_id = out.sample.id,
                        delivered = out.broadcast.delivered,
                        dropped = out.broadcast.dropped,
                        "Broadcast sample"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Sampling tick failed");
            }
        }
    }

    tracing::info!("Sampler stopping");
}
