//! Periodic facility directory refresh.
//!
//! Only runs when `PULSEWAY_DIRECTORY_REFRESH_SECS` is non-zero. Between
//! ticks the directory still changes only through registration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::backoff::Backoff;
use crate::directory::FacilityDirectory;

const REFRESH_BACKOFF_MAX_SECS: u64 = 300;

pub async fn run_directory_refresh_loop(
    directory: Arc<FacilityDirectory>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut backoff = Backoff::new(period, Duration::from_secs(REFRESH_BACKOFF_MAX_SECS));

    tracing::info!("Directory refresh loop started (every {:?})", period);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Directory refresh loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if !backoff.ready() {
                    continue;
                }
                match directory.refresh().await {
                    Ok(count) => {
                        if backoff.failures() > 0 {
                            tracing::info!("Directory refresh recovered ({} facilities)", count);
                        }
                        backoff.reset();
                    }
                    Err(err) => {
                        let delay = backoff.fail();
                        tracing::warn!(
                            "Directory refresh failed: {} (backing off {:?})",
                            err,
                            delay
                        );
                    }
                }
            }
        }
    }
}
