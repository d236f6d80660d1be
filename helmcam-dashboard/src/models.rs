use serde::{Deserialize, Serialize};

/// Last known state of one camera unit.
///
/// Absent readings stay `None` all the way to the view; they are shown as
/// "unknown" and never feed an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub channel: Option<u8>,
    pub signal_strength_dbm: Option<f64>,
    pub battery_percent: Option<f64>,
    pub temperature_c: Option<f64>,
    pub recording: bool,
    pub online: bool,
}

impl DeviceSnapshot {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            channel: None,
            signal_strength_dbm: None,
            battery_percent: None,
            temperature_c: None,
            recording: false,
            online: true,
        }
    }
}

/// Partial update: only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPatch {
    pub channel: Option<u8>,
    pub signal_strength_dbm: Option<f64>,
    pub battery_percent: Option<f64>,
    pub temperature_c: Option<f64>,
    pub recording: Option<bool>,
}

impl SnapshotPatch {
    pub fn recording(recording: bool) -> Self {
        Self { recording: Some(recording), ..Self::default() }
    }

    /// Applies the supplied fields and reports whether anything changed.
    pub fn apply_to(&self, snapshot: &mut DeviceSnapshot) -> bool {
        let before = snapshot.clone();
        if let Some(channel) = self.channel {
            snapshot.channel = Some(channel);
        }
        if let Some(dbm) = self.signal_strength_dbm {
            snapshot.signal_strength_dbm = Some(dbm);
        }
        if let Some(battery) = self.battery_percent {
            snapshot.battery_percent = Some(battery);
        }
        if let Some(temp) = self.temperature_c {
            snapshot.temperature_c = Some(temp);
        }
        if let Some(recording) = self.recording {
            snapshot.recording = recording;
        }
        *snapshot != before
    }
}

// Payloads published by the receiver on the event bus

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub battery_percent: Option<f64>,
    pub rssi: Option<f64>,
    pub temperature: Option<f64>,
    pub channel: Option<u8>,
}

impl From<&TelemetryReading> for SnapshotPatch {
    fn from(r: &TelemetryReading) -> Self {
        SnapshotPatch {
            channel: r.channel,
            signal_strength_dbm: r.rssi,
            battery_percent: r.battery_percent,
            temperature_c: r.temperature,
            recording: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub device_id: String,
    #[serde(default)]
    pub data: TelemetryReading,
}

/// `camera_disconnected`, `recording_started`, `recording_stopped`, `request_video_frame`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRef {
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub device_id: String,
    /// base64 encoded JPEG
    pub frame: String,
}

// REST payloads

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraList {
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEntry {
    pub device_id: String,
    pub channel: Option<u8>,
    pub signal_strength: Option<f64>,
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub recording: Option<bool>,
}

impl CameraEntry {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            channel: None,
            signal_strength: None,
            battery: None,
            temperature: None,
            recording: None,
        }
    }
}

impl From<&CameraEntry> for SnapshotPatch {
    fn from(c: &CameraEntry) -> Self {
        SnapshotPatch {
            channel: c.channel,
            signal_strength_dbm: c.signal_strength,
            battery_percent: c.battery,
            temperature_c: c.temperature,
            recording: c.recording,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub success: bool,
    pub error: Option<String>,
}
