//! Pull channel and timer producers.

use crate::commands::CommandClient;
use crate::health::HealthTracker;
use crate::reconciler::{DashboardEvent, EventSender, PullOutcome, Stamped};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Fetches `/api/cameras` every `period`, first fetch immediately.
/// A fetch suspends only this task; its result is stamped when it arrives.
pub fn spawn_camera_poller(
    api: CommandClient,
    period: Duration,
    tx: EventSender,
    health: HealthTracker,
) -> JoinHandle<()> {
    task::spawn(async move {
        info!("camera refresh every {}ms", period.as_millis());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let outcome = match api.list_cameras().await {
                Ok(list) => {
                    health.record_pull(true);
                    debug!(cameras = list.cameras.len(), "camera list refreshed");
                    PullOutcome::Snapshot(list.cameras)
                }
                Err(e) => {
                    health.record_pull(false);
                    warn!("failed to refresh cameras: {e}");
                    PullOutcome::Failed(e.to_string())
                }
            };
            if tx.send(Stamped::now(DashboardEvent::Pull(outcome))).is_err() {
                break;
            }
        }
    })
}

/// Drives alert expiry and idle-surface checks.
pub fn spawn_ticker(period: Duration, tx: EventSender) -> JoinHandle<()> {
    task::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if tx.send(Stamped::now(DashboardEvent::Tick)).is_err() {
                break;
            }
        }
    })
}
