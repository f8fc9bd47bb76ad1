use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::engine::Engine;

/// Background task that periodically completes confirmed reservations whose
/// slot has ended.
pub async fn run_completion_sweeper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        sweep(&engine, Local::now().naive_local()).await;
    }
}

/// One pass. Returns how many reservations were completed.
pub async fn sweep(engine: &Engine, now: NaiveDateTime) -> usize {
    let mut completed = 0;
    for id in engine.collect_elapsed(now).await {
        match engine.complete_reservation(id, now).await {
            Ok(_) => {
                info!("completed elapsed reservation {id}");
                metrics::counter!(crate::observability::SWEEPER_COMPLETED_TOTAL).increment(1);
                completed += 1;
            }
            Err(e) => {
                // Cancelled between collection and completion.
                tracing::debug!("sweeper skip {id}: {e}");
            }
        }
    }
    completed
}
