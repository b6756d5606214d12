//! Periodic removal of finished jobs past their retention window.

use crate::queue::Shared;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub(crate) async fn run(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = shared.config.purge_interval();
    let retention = shared.config.retention();

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = period.as_secs(),
        retention_secs = retention.as_secs(),
        "Retention sweeper started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let removed = shared.purge_older_than(retention);
                debug!(removed, "Retention sweep finished");
            }
        }
    }

    info!("Retention sweeper stopped");
}
