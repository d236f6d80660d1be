/*!
Test harness driving a `Dashboard` directly.

Events are queued with `push`/`pull` and applied together by `reconcile`,
which is exactly one reconciliation tick. Run harness tests on a paused
clock (`#[tokio::test(start_paused = true)]`) so `advance` is exact.
*/

use crate::bus_stub::MockBus;
use anyhow::Result;
use helmcam_dashboard::alerts::AlertKind;
use helmcam_dashboard::models::CameraList;
use helmcam_dashboard::reconciler::{
    Dashboard, DashboardEvent, PullOutcome, ReconcilerSettings, Stamped,
};
use helmcam_dashboard::render::{DeviceView, SharedView};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct TestHarness {
    pub bus: MockBus,
    pub view: SharedView,
    pub dashboard: Dashboard,
    pending: Vec<Stamped<DashboardEvent>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(ReconcilerSettings::default())
    }

    pub fn with_settings(settings: ReconcilerSettings) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let bus = MockBus::default();
        let view = SharedView::new();
        let dashboard = Dashboard::new(settings, Arc::new(bus.clone()), Box::new(view.clone()));
        Self { bus, view, dashboard, pending: Vec::new() }
    }

    /// Queues an event bus publish on `{prefix}/events/{event}`.
    pub fn push(&mut self, event: &str, payload: Value) -> Result<&mut Self> {
        let stamped = self.bus.incoming(event, &payload)?;
        self.pending.push(stamped);
        Ok(self)
    }

    /// Queues a `/api/cameras` response body.
    pub fn pull(&mut self, body: Value) -> Result<&mut Self> {
        let list: CameraList = serde_json::from_value(body)?;
        self.pending.push(Stamped::now(DashboardEvent::Pull(PullOutcome::Snapshot(list.cameras))));
        Ok(self)
    }

    pub fn pull_failed(&mut self, reason: &str) -> &mut Self {
        self.pending.push(Stamped::now(DashboardEvent::Pull(PullOutcome::Failed(reason.to_string()))));
        self
    }

    /// Applies everything queued as one batch.
    pub fn reconcile(&mut self) -> &mut Self {
        let batch = std::mem::take(&mut self.pending);
        self.dashboard.apply_batch(batch);
        self
    }

    /// Lets `by` elapse (pacer loops run meanwhile), then delivers one timer tick.
    pub async fn advance(&mut self, by: Duration) -> &mut Self {
        tokio::time::sleep(by).await;
        self.dashboard.apply(Stamped::now(DashboardEvent::Tick));
        self
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceView> {
        self.view.snapshot().device(device_id).cloned()
    }

    pub fn active_alerts(&self, device_id: &str) -> Vec<AlertKind> {
        self.dashboard.alerts().active_for(device_id, Instant::now())
    }

    pub fn assert_alerts(&self, device_id: &str, expected: &[AlertKind]) -> Result<()> {
        let mut actual = self.active_alerts(device_id);
        actual.sort_by_key(|k| k.as_str());
        let mut expected = expected.to_vec();
        expected.sort_by_key(|k| k.as_str());
        if actual != expected {
            anyhow::bail!("alerts for {device_id}: expected {expected:?}, got {actual:?}");
        }
        Ok(())
    }

    /// Checks that nothing about the device survives: entry, alerts, pacer, surface.
    pub fn assert_torn_down(&self, device_id: &str) -> Result<()> {
        if self.dashboard.registry().contains(device_id) {
            anyhow::bail!("{device_id} still in the registry");
        }
        if !self.dashboard.alerts().active_for(device_id, Instant::now()).is_empty() {
            anyhow::bail!("{device_id} still has alerts");
        }
        if self.dashboard.pacers().is_mounted(device_id) {
            anyhow::bail!("{device_id} still has a frame pacer");
        }
        if self.view.surface_status(device_id).is_some() || self.device(device_id).is_some() {
            anyhow::bail!("{device_id} still rendered");
        }
        Ok(())
    }

    pub fn get_stats(&self) -> HarnessStats {
        HarnessStats {
            devices: self.dashboard.registry().len(),
            active_alerts: self.dashboard.alerts().active(Instant::now()).len(),
            renders: self.view.render_count(),
            frame_requests: self.bus.requests().len(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessStats {
    pub devices: usize,
    pub active_alerts: usize,
    pub renders: u64,
    pub frame_requests: usize,
}
