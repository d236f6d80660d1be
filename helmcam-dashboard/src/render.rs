/**
 * RENDER LAYER - Seam between reconciled state and whatever draws it
 *
 * ROLE: `Dashboard` builds a `DashboardView` after every registry change and
 * hands it to a `RenderLayer`. Display rules live here (unknown vs. value,
 * signal/battery classes, badges); the layer itself only draws.
 *
 * `SharedView` is the headless layer used by the binary: it keeps the latest
 * view behind a mutex for the operator HTTP API.
 */

use crate::alerts::{signal_percent, AlertKind, BatteryClass, SignalClass};
use crate::models::DeviceSnapshot;
use crate::pacer::FrameSurface;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const UNKNOWN: &str = "unknown";

/// Published view state, written by the reconciler task and read by the HTTP API.
pub type Shared<T> = Arc<Mutex<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

pub trait RenderLayer: Send {
    fn render(&mut self, view: &DashboardView);
    fn connection_changed(&mut self, connected: bool);
    fn mount_surface(&mut self, device_id: &str) -> Box<dyn FrameSurface>;
    fn unmount_surface(&mut self, device_id: &str);
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    pub kind: AlertKind,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub device_id: String,
    pub online: bool,
    pub recording: bool,
    pub channel: String,
    pub signal: String,
    pub signal_percent: Option<f64>,
    pub signal_class: Option<SignalClass>,
    pub battery: String,
    pub battery_class: BatteryClass,
    pub temperature: String,
    pub alerts: Vec<AlertView>,
}

impl DeviceView {
    pub fn build(snapshot: &DeviceSnapshot, alerts: &[AlertKind]) -> Self {
        let percent = snapshot.signal_strength_dbm.map(signal_percent);
        Self {
            device_id: snapshot.device_id.clone(),
            online: snapshot.online,
            recording: snapshot.recording,
            channel: display_or_unknown(snapshot.channel, |c| c.to_string()),
            signal: display_or_unknown(snapshot.signal_strength_dbm, |d| format!("{d} dBm")),
            signal_percent: percent,
            signal_class: percent.map(SignalClass::from_percent),
            battery: display_or_unknown(snapshot.battery_percent, |b| format!("{b}%")),
            battery_class: BatteryClass::from_percent(snapshot.battery_percent),
            temperature: display_or_unknown(snapshot.temperature_c, |t| format!("{t:.1}°C")),
            alerts: alerts
                .iter()
                .map(|k| AlertView { kind: *k, label: k.label() })
                .collect(),
        }
    }
}

fn display_or_unknown<T>(value: Option<T>, fmt: impl FnOnce(T) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| UNKNOWN.to_string())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub connected: bool,
    pub active_cameras: usize,
    pub recording_count: usize,
    pub devices: Vec<DeviceView>,
}

impl DashboardView {
    pub fn device(&self, device_id: &str) -> Option<&DeviceView> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}

/// "1h 2m", "3m 4s" or "5s".
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Header clock, HH:MM:SS.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

#[derive(Debug, Default, Serialize)]
pub struct SurfaceStats {
    pub frames_drawn: u64,
    pub last_frame_bytes: u64,
    pub no_signal: bool,
}

/// Headless surface: counts frames instead of drawing them.
#[derive(Clone, Default)]
pub struct CountingSurface {
    stats: Shared<SurfaceStats>,
}

impl FrameSurface for CountingSurface {
    fn draw_frame(&mut self, jpeg: &[u8]) {
        let mut stats = self.stats.lock();
        stats.frames_drawn += 1;
        stats.last_frame_bytes = jpeg.len() as u64;
        stats.no_signal = false;
    }

    fn draw_no_signal(&mut self) {
        self.stats.lock().no_signal = true;
    }
}

/// Render layer publishing the latest view for readers on other tasks.
#[derive(Clone)]
pub struct SharedView {
    view: Shared<DashboardView>,
    surfaces: Shared<HashMap<String, CountingSurface>>,
    renders: Arc<AtomicU64>,
}

impl Default for SharedView {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedView {
    pub fn new() -> Self {
        Self {
            view: shared(DashboardView::default()),
            surfaces: shared(HashMap::new()),
            renders: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> DashboardView {
        self.view.lock().clone()
    }

    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// (frames drawn, showing no-signal) for a mounted surface.
    pub fn surface_status(&self, device_id: &str) -> Option<(u64, bool)> {
        let surfaces = self.surfaces.lock();
        let surface = surfaces.get(device_id)?;
        let stats = surface.stats.lock();
        Some((stats.frames_drawn, stats.no_signal))
    }
}

impl RenderLayer for SharedView {
    fn render(&mut self, view: &DashboardView) {
        *self.view.lock() = view.clone();
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_changed(&mut self, connected: bool) {
        self.view.lock().connected = connected;
    }

    fn mount_surface(&mut self, device_id: &str) -> Box<dyn FrameSurface> {
        let surface = CountingSurface::default();
        self.surfaces.lock().insert(device_id.to_string(), surface.clone());
        Box::new(surface)
    }

    fn unmount_surface(&mut self, device_id: &str) {
        self.surfaces.lock().remove(device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_render_unknown_not_zero() {
        let view = DeviceView::build(&DeviceSnapshot::new("D1"), &[]);
        assert_eq!(view.channel, UNKNOWN);
        assert_eq!(view.signal, UNKNOWN);
        assert_eq!(view.battery, UNKNOWN);
        assert_eq!(view.temperature, UNKNOWN);
        assert_eq!(view.signal_percent, None);
        assert_eq!(view.signal_class, None);
        assert_eq!(view.battery_class, BatteryClass::Low);
    }

    #[test]
    fn test_present_fields_formatting() {
        let snap = DeviceSnapshot {
            channel: Some(3),
            signal_strength_dbm: Some(-70.0),
            battery_percent: Some(15.0),
            temperature_c: Some(36.54),
            recording: true,
            ..DeviceSnapshot::new("D1")
        };
        let view = DeviceView::build(&snap, &[AlertKind::LowBattery]);
        assert_eq!(view.channel, "3");
        assert_eq!(view.signal, "-70 dBm");
        assert_eq!(view.signal_percent, Some(50.0));
        assert_eq!(view.signal_class, Some(SignalClass::Medium));
        assert_eq!(view.battery, "15%");
        assert_eq!(view.temperature, "36.5°C");
        assert_eq!(view.alerts[0].label, "Low Battery");
    }

    #[test]
    fn test_uptime_formats() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(184), "3m 4s");
        assert_eq!(format_uptime(3720), "1h 2m");
        assert_eq!(format_clock(3723), "01:02:03");
    }

    #[test]
    fn test_shared_view_tracks_surfaces() {
        let mut layer = SharedView::new();
        let mut surface = layer.mount_surface("D1");
        surface.draw_frame(b"jpeg");
        surface.draw_no_signal();
        assert_eq!(layer.surface_status("D1"), Some((1, true)));

        layer.unmount_surface("D1");
        assert_eq!(layer.surface_status("D1"), None);

        layer.render(&DashboardView { active_cameras: 2, ..Default::default() });
        layer.connection_changed(true);
        let view = layer.snapshot();
        assert!(view.connected);
        assert_eq!(view.active_cameras, 2);
        assert_eq!(layer.render_count(), 1);
    }
}
