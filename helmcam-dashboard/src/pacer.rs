//! Frame pacing: one open-loop request loop per mounted device surface.
//!
//! Requests go out every `frame_interval` whether or not earlier frames came
//! back. Received frames are drawn in arrival order; nothing is reordered and
//! the latest arrival always replaces what is on the surface.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Outbound `request_video_frame`.
pub trait FrameRequester: Send + Sync {
    fn request_frame(&self, device_id: &str);
}

/// Per-device render target.
pub trait FrameSurface: Send {
    fn draw_frame(&mut self, jpeg: &[u8]);
    fn draw_no_signal(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePacerState {
    pub active: bool,
    pub last_frame_received_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    Drawn,
    /// No active pacer for the device (never mounted, unmounted, or late response).
    Discarded,
    Undecodable,
}

pub struct FramePacer {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
    surface: Box<dyn FrameSurface>,
    mounted_at: Instant,
    last_frame_received_at: Option<Instant>,
    showing_no_signal: bool,
}

impl FramePacer {
    /// Spawns the request loop on the current tokio runtime.
    pub fn start(
        device_id: &str,
        surface: Box<dyn FrameSurface>,
        requester: Arc<dyn FrameRequester>,
        frame_interval: Duration,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let id = device_id.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                requester.request_frame(&id);
            }
            debug!(device_id = %id, "frame pacer loop finished");
        });

        Self {
            active,
            task,
            surface,
            mounted_at: Instant::now(),
            last_frame_received_at: None,
            showing_no_signal: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn state(&self) -> FramePacerState {
        FramePacerState {
            active: self.is_active(),
            last_frame_received_at: self.last_frame_received_at,
        }
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.task.abort();
    }

    fn draw(&mut self, jpeg: &[u8], now: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        self.surface.draw_frame(jpeg);
        self.last_frame_received_at = Some(now);
        self.showing_no_signal = false;
        true
    }

    fn show_no_signal(&mut self) {
        self.surface.draw_no_signal();
        self.showing_no_signal = true;
    }

    fn idle_since(&self) -> Instant {
        self.last_frame_received_at.unwrap_or(self.mounted_at)
    }
}

impl Drop for FramePacer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// All pacers of one dashboard, keyed by device id.
pub struct PacerBank {
    requester: Arc<dyn FrameRequester>,
    frame_interval: Duration,
    no_signal_after: Option<Duration>,
    pacers: HashMap<String, FramePacer>,
}

impl PacerBank {
    pub fn new(
        requester: Arc<dyn FrameRequester>,
        frame_interval: Duration,
        no_signal_after: Option<Duration>,
    ) -> Self {
        Self {
            requester,
            frame_interval,
            no_signal_after,
            pacers: HashMap::new(),
        }
    }

    /// Starts pacing for the surface; a previous pacer for the device is stopped first.
    pub fn mount(&mut self, device_id: &str, surface: Box<dyn FrameSurface>) {
        let pacer = FramePacer::start(device_id, surface, self.requester.clone(), self.frame_interval);
        if let Some(mut old) = self.pacers.insert(device_id.to_string(), pacer) {
            old.stop();
        }
        debug!(device_id, "frame pacer mounted");
    }

    pub fn unmount(&mut self, device_id: &str) -> bool {
        match self.pacers.remove(device_id) {
            Some(mut pacer) => {
                pacer.stop();
                debug!(device_id, "frame pacer unmounted");
                true
            }
            None => false,
        }
    }

    pub fn deliver(&mut self, device_id: &str, encoded: &str, now: Instant) -> FrameDelivery {
        let Some(pacer) = self.pacers.get_mut(device_id) else {
            return FrameDelivery::Discarded;
        };
        if !pacer.is_active() {
            return FrameDelivery::Discarded;
        }
        let payload = encoded
            .strip_prefix("data:image/jpeg;base64,")
            .unwrap_or(encoded);
        match STANDARD.decode(payload.trim()) {
            Ok(jpeg) => {
                if pacer.draw(&jpeg, now) {
                    FrameDelivery::Drawn
                } else {
                    FrameDelivery::Discarded
                }
            }
            Err(e) => {
                warn!(device_id, "dropping undecodable video frame: {e}");
                FrameDelivery::Undecodable
            }
        }
    }

    pub fn show_no_signal(&mut self, device_id: &str) {
        if let Some(pacer) = self.pacers.get_mut(device_id) {
            pacer.show_no_signal();
        }
    }

    /// Switches idle surfaces to the placeholder, once per idle period.
    pub fn check_idle(&mut self, now: Instant) -> Vec<String> {
        let Some(limit) = self.no_signal_after else {
            return Vec::new();
        };
        let mut switched = Vec::new();
        for (device_id, pacer) in self.pacers.iter_mut() {
            if pacer.showing_no_signal || !pacer.is_active() {
                continue;
            }
            if now.saturating_duration_since(pacer.idle_since()) >= limit {
                pacer.show_no_signal();
                switched.push(device_id.clone());
            }
        }
        switched
    }

    pub fn state(&self, device_id: &str) -> Option<FramePacerState> {
        self.pacers.get(device_id).map(FramePacer::state)
    }

    pub fn is_mounted(&self, device_id: &str) -> bool {
        self.pacers.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.pacers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pacers.is_empty()
    }

    pub fn shutdown(&mut self) {
        for (_, mut pacer) in self.pacers.drain() {
            pacer.stop();
        }
    }
}
