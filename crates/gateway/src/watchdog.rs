//! Watchdog (spec §4.5): the sole auto-restart driver. Samples every
//! stream every 5 seconds and issues `start`/`stop` with "watcher" origin
//! through the Manager; never surfaces errors, only logs them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::lifecycle::Origin;
use crate::manager::{Manager, RETRY_FLOOR};
use crate::model::StreamState;
use crate::stream::unix_now;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(manager: Arc<Manager>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(TICK_INTERVAL) => {
                tick(&manager).await;
            }
        }
    }
}

async fn tick(manager: &Arc<Manager>) {
    for sample in manager.watchdog_sample().await {
        if !sample.enabled {
            continue;
        }

        if !sample.active && sample.status == StreamState::Started {
            warn!(stream_id = sample.id, "watchdog: stream went inactive while Started");
            if let Err(e) = manager.stop_stream(sample.id, Origin::Watcher).await {
                warn!(stream_id = sample.id, error = %e, "watchdog stop failed");
            }
            continue;
        }

        if sample.active && sample.status != StreamState::Started {
            warn!(
                stream_id = sample.id,
                status = ?sample.status,
                "watchdog: stream active but not in Started state"
            );
            continue;
        }

        if !sample.active {
            let since_last_attempt = sample
                .last_attempt_time
                .map(|t| unix_now().saturating_sub(t))
                .unwrap_or(u64::MAX);

            if since_last_attempt >= RETRY_FLOOR.as_secs() {
                if let Err(e) = manager.start_stream(sample.id, Origin::Watcher).await {
                    warn!(stream_id = sample.id, error = %e, "watchdog start failed");
                }
            }
        }
    }
}
