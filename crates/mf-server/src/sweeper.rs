//! Background retention sweeper.
//!
//! Periodically evicts finished jobs whose retention period has passed,
//! which also deletes whatever is left of their scratch directories.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mf_core::events::EventPayload;

use crate::context::AppContext;

/// Run the sweeper until the cancellation token is triggered.
pub async fn run_retention_sweeper(ctx: AppContext, cancel: CancellationToken) {
    let period = Duration::from_secs(ctx.config.jobs.sweep_interval_secs.max(1));
    tracing::info!(
        "Retention sweeper started (every {}s, retention {}s)",
        period.as_secs(),
        ctx.config.jobs.retention_secs
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_once(&ctx);
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("Retention sweeper stopped");
}

/// Evict expired jobs now and return how many were removed.
pub fn sweep_once(ctx: &AppContext) -> usize {
    let evicted = ctx.store.evict_expired_ids(Utc::now());
    for &job_id in &evicted {
        tracing::debug!(job_id = %job_id, "Evicted expired job");
        ctx.event_bus.broadcast(EventPayload::JobEvicted { job_id });
    }
    if !evicted.is_empty() {
        tracing::info!(count = evicted.len(), remaining = ctx.store.len(), "Evicted expired jobs");
    }
    evicted.len()
}
