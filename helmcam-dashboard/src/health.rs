use crate::render::{format_clock, format_uptime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardHealth {
    pub uptime_seconds: u64,
    pub uptime: String,
    /// HH:MM:SS header clock.
    pub uptime_clock: String,
    pub transport_status: String,
    pub transport_reconnects: u32,
    pub pull_successes: u64,
    pub pull_failures: u64,
    pub last_pull_at: Option<String>,
    pub devices_tracked: usize,
}

/// Counters shared by the transport, the poller, the reconciler and the HTTP API.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    transport_status: Arc<Mutex<String>>,
    transport_reconnects: Arc<AtomicU32>,
    pull_successes: Arc<AtomicU64>,
    pull_failures: Arc<AtomicU64>,
    last_pull_at: Arc<Mutex<Option<OffsetDateTime>>>,
    devices_tracked: Arc<AtomicUsize>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            transport_status: Arc::new(Mutex::new("connecting".to_string())),
            transport_reconnects: Arc::new(AtomicU32::new(0)),
            pull_successes: Arc::new(AtomicU64::new(0)),
            pull_failures: Arc::new(AtomicU64::new(0)),
            last_pull_at: Arc::new(Mutex::new(None)),
            devices_tracked: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn mark_transport_connected(&self) {
        *self.transport_status.lock() = "connected".to_string();
    }

    /// Returns false when the transport was already marked disconnected.
    pub fn mark_transport_disconnected(&self) -> bool {
        let mut status = self.transport_status.lock();
        if *status == "disconnected" {
            return false;
        }
        let was_connected = *status == "connected";
        *status = "disconnected".to_string();
        if was_connected {
            self.transport_reconnects.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    pub fn is_transport_connected(&self) -> bool {
        *self.transport_status.lock() == "connected"
    }

    pub fn record_pull(&self, ok: bool) {
        if ok {
            self.pull_successes.fetch_add(1, Ordering::Relaxed);
            *self.last_pull_at.lock() = Some(OffsetDateTime::now_utc());
        } else {
            self.pull_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_devices_tracked(&self, count: usize) {
        self.devices_tracked.store(count, Ordering::Relaxed);
    }

    pub fn get_health(&self) -> DashboardHealth {
        let uptime = self.start_time.elapsed().as_secs();
        let last_pull_at = *self.last_pull_at.lock();
        DashboardHealth {
            uptime_seconds: uptime,
            uptime: format_uptime(uptime),
            uptime_clock: format_clock(uptime),
            transport_status: self.transport_status.lock().clone(),
            transport_reconnects: self.transport_reconnects.load(Ordering::Relaxed),
            pull_successes: self.pull_successes.load(Ordering::Relaxed),
            pull_failures: self.pull_failures.load(Ordering::Relaxed),
            last_pull_at: last_pull_at.and_then(|t| t.format(&Rfc3339).ok()),
            devices_tracked: self.devices_tracked.load(Ordering::Relaxed),
        }
    }
}
