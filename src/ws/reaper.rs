use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::hub::HubHandle;

/// Periodically ask the hub to disconnect clients silent past `idle_timeout`.
///
/// The hub runs the same disconnect path used for explicit closes, so a reap
/// racing a close is absorbed there.
pub fn spawn_reaper(hub: HubHandle, every: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    info!("Idle reaper running every {:?}, threshold {:?}", every, idle_timeout);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Idle sweep");
            hub.reap(idle_timeout);
        }
    })
}
