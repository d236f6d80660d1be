/**
 * TELEMETRY RECONCILER - One queue, two sources of truth
 *
 * ROLE: merges push events (event bus) and pull snapshots (periodic REST
 * refresh) into the device registry, keeps alerts and frame pacers in step
 * with it and re-renders after every change.
 *
 * RULES:
 * - Every event is stamped at receipt by its producer; later receipt wins.
 * - Inside one reconciliation tick (everything queued when the loop wakes up)
 *   pull outcomes are applied first, so a push overrides a pull for the same field.
 * - An explicit disconnect removes the device at once. A pull that omits a known
 *   device counts a miss; `missed_pull_threshold` consecutive misses remove it.
 * - Removal tears down the device's alerts and pacer together with the entry.
 * - Only telemetry (pushed or fetched on demand) evaluates alerts; pulls and
 *   recording events update the registry without raising anything.
 *
 * `Dashboard` is the only owner of this state and is driven by a single task,
 * so nothing here is locked.
 */

use crate::alerts::{AlertBook, DEFAULT_ALERT_TTL};
use crate::config::DashboardConfig;
use crate::health::HealthTracker;
use crate::models::{CameraEntry, SnapshotPatch, TelemetryReading, TelemetryUpdate, VideoFrame};
use crate::pacer::{FrameDelivery, FrameRequester, PacerBank, DEFAULT_FRAME_INTERVAL};
use crate::registry::{DeviceRegistry, RegistryChange};
use crate::render::{DashboardView, DeviceView, RenderLayer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum PushEvent {
    Connected,
    Disconnected,
    Telemetry(TelemetryUpdate),
    CameraDisconnected(String),
    RecordingStarted(String),
    RecordingStopped(String),
    VideoFrame(VideoFrame),
}

#[derive(Debug, Clone)]
pub enum PullOutcome {
    Snapshot(Vec<CameraEntry>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Push(PushEvent),
    Pull(PullOutcome),
    /// Answer to an on-demand `GET /api/telemetry/{id}`.
    TelemetryFetched { device_id: String, reading: TelemetryReading },
    Tick,
}

#[derive(Debug, Clone)]
pub struct Stamped<E> {
    pub received_at: Instant,
    pub event: E,
}

impl<E> Stamped<E> {
    pub fn now(event: E) -> Self {
        Self { received_at: Instant::now(), event }
    }
}

pub type EventSender = mpsc::UnboundedSender<Stamped<DashboardEvent>>;
pub type EventReceiver = mpsc::UnboundedReceiver<Stamped<DashboardEvent>>;

pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub missed_pull_threshold: u32,
    pub alert_ttl: Duration,
    pub frame_interval: Duration,
    pub no_signal_after: Option<Duration>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            missed_pull_threshold: 1,
            alert_ttl: DEFAULT_ALERT_TTL,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            no_signal_after: Some(Duration::from_secs(3)),
        }
    }
}

impl From<&DashboardConfig> for ReconcilerSettings {
    fn from(cfg: &DashboardConfig) -> Self {
        Self {
            missed_pull_threshold: cfg.missed_pull_threshold,
            alert_ttl: Duration::from_millis(cfg.alert_ttl_ms),
            frame_interval: Duration::from_millis(cfg.frame_interval_ms),
            no_signal_after: cfg.no_signal_after_ms.map(Duration::from_millis),
        }
    }
}

pub struct Dashboard {
    registry: DeviceRegistry,
    alerts: AlertBook,
    pacers: PacerBank,
    missed_pulls: HashMap<String, u32>,
    missed_pull_threshold: u32,
    render: Box<dyn RenderLayer>,
    connected: bool,
    health: Option<HealthTracker>,
}

impl Dashboard {
    pub fn new(
        settings: ReconcilerSettings,
        requester: Arc<dyn FrameRequester>,
        render: Box<dyn RenderLayer>,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            alerts: AlertBook::new(settings.alert_ttl),
            pacers: PacerBank::new(requester, settings.frame_interval, settings.no_signal_after),
            missed_pulls: HashMap::new(),
            missed_pull_threshold: settings.missed_pull_threshold.max(1),
            render,
            connected: false,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthTracker) -> Self {
        self.health = Some(health);
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn alerts(&self) -> &AlertBook {
        &self.alerts
    }

    pub fn pacers(&self) -> &PacerBank {
        &self.pacers
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn missed_pulls(&self, device_id: &str) -> u32 {
        self.missed_pulls.get(device_id).copied().unwrap_or(0)
    }

    /// Registry write path: merge, mount on first sighting, render.
    /// `reevaluate` raises whatever alerts the merged snapshot calls for.
    pub fn upsert(
        &mut self,
        device_id: &str,
        patch: &SnapshotPatch,
        now: Instant,
        reevaluate: bool,
    ) -> RegistryChange {
        let change = self.registry.upsert(device_id, patch);
        if change == RegistryChange::Created {
            info!(device_id, "camera online");
            let surface = self.render.mount_surface(device_id);
            self.pacers.mount(device_id, surface);
        }
        if let Some(snapshot) = self.registry.get(device_id).filter(|_| reevaluate) {
            for kind in self.alerts.raise_for(snapshot, now) {
                warn!(device_id, alert = %kind, "alert raised");
            }
        }
        self.publish(now);
        change
    }

    /// Registry removal path; unknown devices are ignored.
    pub fn remove(&mut self, device_id: &str, now: Instant) -> bool {
        let Some(_removed) = self.registry.remove(device_id) else {
            return false;
        };
        let cleared = self.alerts.clear_device(device_id);
        self.pacers.unmount(device_id);
        self.render.unmount_surface(device_id);
        self.missed_pulls.remove(device_id);
        info!(device_id, alerts_cleared = cleared, "camera removed");
        self.publish(now);
        true
    }

    fn disconnect(&mut self, device_id: &str, now: Instant) {
        self.pacers.show_no_signal(device_id);
        self.remove(device_id, now);
    }

    pub fn apply(&mut self, stamped: Stamped<DashboardEvent>) {
        let now = stamped.received_at;
        match stamped.event {
            DashboardEvent::Push(push) => self.apply_push(push, now),
            DashboardEvent::Pull(PullOutcome::Snapshot(cameras)) => self.apply_pull(&cameras, now),
            DashboardEvent::Pull(PullOutcome::Failed(reason)) => {
                warn!("camera refresh failed, keeping current state: {reason}");
            }
            DashboardEvent::TelemetryFetched { device_id, reading } => {
                self.upsert(&device_id, &SnapshotPatch::from(&reading), now, true);
            }
            DashboardEvent::Tick => self.tick(now),
        }
    }

    /// One reconciliation tick: pulls first, then everything else in receipt order.
    pub fn apply_batch(&mut self, batch: Vec<Stamped<DashboardEvent>>) {
        let (pulls, rest): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|s| matches!(s.event, DashboardEvent::Pull(_)));
        for stamped in pulls.into_iter().chain(rest) {
            self.apply(stamped);
        }
    }

    fn apply_push(&mut self, push: PushEvent, now: Instant) {
        match push {
            PushEvent::Connected => self.set_connected(true, now),
            PushEvent::Disconnected => self.set_connected(false, now),
            PushEvent::Telemetry(update) => {
                debug!(device_id = %update.device_id, "telemetry update");
                self.upsert(&update.device_id, &SnapshotPatch::from(&update.data), now, true);
            }
            PushEvent::CameraDisconnected(device_id) => self.disconnect(&device_id, now),
            PushEvent::RecordingStarted(device_id) => {
                info!(device_id, "recording started");
                self.upsert(&device_id, &SnapshotPatch::recording(true), now, false);
            }
            PushEvent::RecordingStopped(device_id) => {
                info!(device_id, "recording stopped");
                self.upsert(&device_id, &SnapshotPatch::recording(false), now, false);
            }
            PushEvent::VideoFrame(frame) => {
                if self.pacers.deliver(&frame.device_id, &frame.frame, now) == FrameDelivery::Discarded {
                    debug!(device_id = %frame.device_id, "frame for unmounted surface discarded");
                }
            }
        }
    }

    fn apply_pull(&mut self, cameras: &[CameraEntry], now: Instant) {
        let mut seen = HashSet::with_capacity(cameras.len());
        for entry in cameras {
            seen.insert(entry.device_id.as_str());
            self.missed_pulls.remove(&entry.device_id);
            self.upsert(&entry.device_id, &SnapshotPatch::from(entry), now, false);
        }

        for device_id in self.registry.ids() {
            if seen.contains(device_id.as_str()) {
                continue;
            }
            let misses = self.missed_pulls.entry(device_id.clone()).or_insert(0);
            *misses += 1;
            if *misses >= self.missed_pull_threshold {
                info!(device_id, misses = *misses, "camera missing from refresh");
                self.disconnect(&device_id, now);
            } else {
                debug!(device_id, misses = *misses, "camera missing from refresh, keeping it");
            }
        }
    }

    fn set_connected(&mut self, connected: bool, now: Instant) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        if connected {
            info!("transport connected");
        } else {
            warn!("transport disconnected");
        }
        self.render.connection_changed(connected);
        self.publish(now);
    }

    /// Timer work: alert expiry and idle surfaces.
    pub fn tick(&mut self, now: Instant) {
        let expired = self.alerts.expire(now);
        for device_id in self.pacers.check_idle(now) {
            debug!(device_id, "no frame within grace window, showing no signal");
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "alerts expired");
            self.publish(now);
        }
    }

    pub fn view(&self, now: Instant) -> DashboardView {
        let devices: Vec<DeviceView> = self
            .registry
            .list()
            .map(|snap| DeviceView::build(snap, &self.alerts.active_for(&snap.device_id, now)))
            .collect();
        DashboardView {
            connected: self.connected,
            active_cameras: devices.len(),
            recording_count: self.registry.recording_count(),
            devices,
        }
    }

    fn publish(&mut self, now: Instant) {
        let view = self.view(now);
        if let Some(health) = &self.health {
            health.set_devices_tracked(view.active_cameras);
        }
        self.render.render(&view);
    }

    /// Stops every pacer and releases every surface.
    pub fn shutdown(&mut self) {
        self.pacers.shutdown();
        for device_id in self.registry.ids() {
            self.render.unmount_surface(&device_id);
        }
        info!("dashboard shut down");
    }

    /// Event loop: each wake-up drains whatever is already queued into one batch.
    /// Returns once every producer is gone.
    pub async fn run(mut self, mut rx: EventReceiver) -> Self {
        info!("reconciler started");
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = rx.try_recv() {
                batch.push(next);
            }
            self.apply_batch(batch);
        }
        self.shutdown();
        self
    }
}
