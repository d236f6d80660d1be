//! Alert engine: threshold evaluation, display classes and the set of
//! currently visible alerts.
//!
//! Evaluation is pure. The `AlertBook` only de-duplicates and expires; it never
//! re-checks conditions on its own, so a condition that persists past the
//! display timeout shows up again only when the device is evaluated again.

use crate::models::DeviceSnapshot;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

pub const LOW_BATTERY_PERCENT: f64 = 20.0;
pub const WEAK_SIGNAL_DBM: f64 = -85.0;
pub const DEFAULT_ALERT_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    LowBattery,
    WeakSignal,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::LowBattery => "low-battery",
            AlertKind::WeakSignal => "weak-signal",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertKind::LowBattery => "Low Battery",
            AlertKind::WeakSignal => "Weak Signal",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alerts the snapshot calls for. Absent readings never raise anything.
pub fn evaluate(snapshot: &DeviceSnapshot) -> Vec<AlertKind> {
    let mut kinds = Vec::new();
    if matches!(snapshot.battery_percent, Some(b) if b < LOW_BATTERY_PERCENT) {
        kinds.push(AlertKind::LowBattery);
    }
    if matches!(snapshot.signal_strength_dbm, Some(s) if s < WEAK_SIGNAL_DBM) {
        kinds.push(AlertKind::WeakSignal);
    }
    kinds
}

/// -90 dBm maps to 0 %, -50 dBm to 100 %, clamped outside.
pub fn signal_percent(dbm: f64) -> f64 {
    ((dbm + 90.0) / 40.0 * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalClass {
    Weak,
    Medium,
    Strong,
}

impl SignalClass {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 30.0 {
            SignalClass::Weak
        } else if percent < 60.0 {
            SignalClass::Medium
        } else {
            SignalClass::Strong
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryClass {
    High,
    Medium,
    Low,
}

impl BatteryClass {
    /// Display only: an unknown level is shown as low but never alerts.
    pub fn from_percent(percent: Option<f64>) -> Self {
        match percent {
            Some(p) if p >= 60.0 => BatteryClass::High,
            Some(p) if p >= 30.0 => BatteryClass::Medium,
            _ => BatteryClass::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    pub device_id: String,
    pub kind: AlertKind,
    pub created_at: Instant,
}

/// Visible alerts, at most one per (device, kind).
#[derive(Debug)]
pub struct AlertBook {
    ttl: Duration,
    alerts: Vec<ActiveAlert>,
}

impl Default for AlertBook {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_TTL)
    }
}

impl AlertBook {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, alerts: Vec::new() }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, alert: &ActiveAlert, now: Instant) -> bool {
        now.saturating_duration_since(alert.created_at) < self.ttl
    }

    /// Returns false when a live alert of that kind already exists for the device.
    pub fn raise(&mut self, device_id: &str, kind: AlertKind, now: Instant) -> bool {
        self.expire(now);
        if self.alerts.iter().any(|a| a.device_id == device_id && a.kind == kind) {
            return false;
        }
        self.alerts.push(ActiveAlert {
            device_id: device_id.to_string(),
            kind,
            created_at: now,
        });
        true
    }

    /// Raises every kind `evaluate` reports for the snapshot; returns the newly created ones.
    pub fn raise_for(&mut self, snapshot: &DeviceSnapshot, now: Instant) -> Vec<AlertKind> {
        evaluate(snapshot)
            .into_iter()
            .filter(|kind| self.raise(&snapshot.device_id, *kind, now))
            .collect()
    }

    /// Drops alerts past their display timeout and returns them.
    pub fn expire(&mut self, now: Instant) -> Vec<ActiveAlert> {
        let (live, expired): (Vec<_>, Vec<_>) = std::mem::take(&mut self.alerts)
            .into_iter()
            .partition(|a| self.is_live(a, now));
        self.alerts = live;
        expired
    }

    pub fn active(&self, now: Instant) -> Vec<ActiveAlert> {
        self.alerts.iter().filter(|a| self.is_live(a, now)).cloned().collect()
    }

    pub fn active_for(&self, device_id: &str, now: Instant) -> Vec<AlertKind> {
        self.alerts
            .iter()
            .filter(|a| a.device_id == device_id && self.is_live(a, now))
            .map(|a| a.kind)
            .collect()
    }

    pub fn clear_device(&mut self, device_id: &str) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.device_id != device_id);
        before - self.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
