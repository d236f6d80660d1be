/*!
Event bus stub for running the reconciler without a broker.

Incoming publishes go through the real topic parser; outbound frame requests
are recorded so tests can assert on the request cadence.
*/

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use helmcam_dashboard::pacer::FrameRequester;
use helmcam_dashboard::reconciler::{DashboardEvent, Stamped};
use helmcam_dashboard::transport::{parse_publish, Topics};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub topic: String,
    pub device_id: String,
}

#[derive(Clone)]
pub struct MockBus {
    topics: Topics,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBus {
    pub fn new(prefix: &str) -> Self {
        Self {
            topics: Topics::new(prefix),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Parses a publish on `{prefix}/events/{event}` and stamps it now.
    pub fn incoming(&self, event: &str, payload: &Value) -> Result<Stamped<DashboardEvent>> {
        let topic = self.topics.event(event);
        let bytes = serde_json::to_vec(payload)?;
        match parse_publish(&self.topics, &topic, &bytes)? {
            Some(push) => Ok(Stamped::now(DashboardEvent::Push(push))),
            None => anyhow::bail!("topic not consumed by the dashboard: {topic}"),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, device_id: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.device_id == device_id).count()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new("helmcam")
    }
}

impl FrameRequester for MockBus {
    fn request_frame(&self, device_id: &str) {
        self.requests.lock().push(RecordedRequest {
            topic: self.topics.request_video_frame(),
            device_id: device_id.to_string(),
        });
    }
}

/// Payloads shaped like the receiver's event bus and REST messages.
pub struct ReceiverMessageBuilder;

impl ReceiverMessageBuilder {
    pub fn telemetry_update(device_id: &str, battery: f64, rssi: f64) -> Value {
        serde_json::json!({
            "device_id": device_id,
            "data": { "battery_percent": battery, "rssi": rssi }
        })
    }

    pub fn telemetry_full(device_id: &str, battery: f64, rssi: f64, temperature: f64, channel: u8) -> Value {
        serde_json::json!({
            "device_id": device_id,
            "data": {
                "battery_percent": battery,
                "rssi": rssi,
                "temperature": temperature,
                "channel": channel
            }
        })
    }

    /// `camera_disconnected`, `recording_started` and `recording_stopped` share this shape.
    pub fn device_event(device_id: &str) -> Value {
        serde_json::json!({ "device_id": device_id })
    }

    pub fn video_frame(device_id: &str, jpeg: &[u8]) -> Value {
        serde_json::json!({ "device_id": device_id, "frame": STANDARD.encode(jpeg) })
    }

    pub fn camera_entry(device_id: &str, battery: f64, signal: f64, recording: bool) -> Value {
        serde_json::json!({
            "device_id": device_id,
            "channel": 1,
            "signal_strength": signal,
            "battery": battery,
            "recording": recording,
            "status": "online"
        })
    }

    pub fn camera_list(entries: Vec<Value>) -> Value {
        serde_json::json!({ "cameras": entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmcam_dashboard::reconciler::PushEvent;

    #[tokio::test]
    async fn test_incoming_goes_through_topic_parser() {
        let bus = MockBus::default();
        let ev = bus
            .incoming("telemetry_update", &ReceiverMessageBuilder::telemetry_update("D1", 15.0, -60.0))
            .unwrap();
        match ev.event {
            DashboardEvent::Push(PushEvent::Telemetry(t)) => {
                assert_eq!(t.device_id, "D1");
                assert_eq!(t.data.battery_percent, Some(15.0));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(bus.incoming("system_status", &serde_json::json!({})).is_err());
        assert!(bus.incoming("video_frame", &serde_json::json!({"frame": 1})).is_err());
    }

    #[test]
    fn test_frame_requests_recorded() {
        let bus = MockBus::new("rig");
        bus.request_frame("D1");
        bus.request_frame("D1");
        bus.request_frame("D2");

        assert_eq!(bus.requests_for("D1"), 2);
        assert_eq!(bus.requests()[0].topic, "rig/commands/request_video_frame");
        bus.clear();
        assert!(bus.requests().is_empty());
    }

    #[test]
    fn test_message_builders() {
        let entry = ReceiverMessageBuilder::camera_entry("D2", 80.0, -70.0, true);
        assert_eq!(entry["device_id"], "D2");
        assert_eq!(entry["recording"], true);

        let frame = ReceiverMessageBuilder::video_frame("D1", b"jpeg");
        assert_eq!(frame["frame"], "anBlZw==");
    }
}
