//! Push channel: receiver events over MQTT.
//!
//! The listener stamps every message at receipt and queues it for the
//! reconciler. Reconnecting is left to rumqttc; the dashboard only reflects
//! connected/disconnected transitions.

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::{DeviceRef, TelemetryUpdate, VideoFrame};
use crate::pacer::FrameRequester;
use crate::reconciler::{DashboardEvent, EventSender, PushEvent, Stamped};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid payload on {topic}: {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Topic layout under the configured prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.trim_end_matches('/').to_string() }
    }

    pub fn events_filter(&self) -> String {
        format!("{}/events/#", self.prefix)
    }

    pub fn event(&self, name: &str) -> String {
        format!("{}/events/{}", self.prefix, name)
    }

    pub fn request_video_frame(&self) -> String {
        format!("{}/commands/request_video_frame", self.prefix)
    }

    fn event_name<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix("/events/")
    }
}

fn decode<'a, T: serde::Deserialize<'a>>(topic: &str, payload: &'a [u8]) -> Result<T, TransportError> {
    serde_json::from_slice(payload).map_err(|source| TransportError::InvalidPayload {
        topic: topic.to_string(),
        source,
    })
}

/// Maps one publish to a push event; `Ok(None)` for topics the dashboard does not consume.
pub fn parse_publish(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Option<PushEvent>, TransportError> {
    let Some(name) = topics.event_name(topic) else {
        return Ok(None);
    };
    let event = match name {
        "telemetry_update" => PushEvent::Telemetry(decode::<TelemetryUpdate>(topic, payload)?),
        "camera_disconnected" => PushEvent::CameraDisconnected(decode::<DeviceRef>(topic, payload)?.device_id),
        "recording_started" => PushEvent::RecordingStarted(decode::<DeviceRef>(topic, payload)?.device_id),
        "recording_stopped" => PushEvent::RecordingStopped(decode::<DeviceRef>(topic, payload)?.device_id),
        "video_frame" => PushEvent::VideoFrame(decode::<VideoFrame>(topic, payload)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let client_id = format!("helmcam-dashboard-{}", Uuid::new_v4().simple());
    let mut opts = MqttOptions::new(client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    // base64 frames are far above the 10 KiB default
    opts.set_max_packet_size(8 * 1024 * 1024, 8 * 1024 * 1024);
    AsyncClient::new(opts, 64)
}

fn send(tx: &EventSender, event: PushEvent) -> bool {
    tx.send(Stamped::now(DashboardEvent::Push(event))).is_ok()
}

/// Polls the event loop until the reconciler queue closes.
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: Topics,
    tx: EventSender,
    health: HealthTracker,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to event bus");
                    // clean session: subscriptions do not survive a reconnect
                    if let Err(e) = client.try_subscribe(topics.events_filter(), QoS::AtMostOnce) {
                        error!("subscribe failed: {e}");
                    }
                    health.mark_transport_connected();
                    if !send(&tx, PushEvent::Connected) {
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    match parse_publish(&topics, &p.topic, &p.payload) {
                        Ok(Some(event)) => {
                            if !send(&tx, event) {
                                break;
                            }
                        }
                        Ok(None) => debug!(topic = %p.topic, "ignoring message"),
                        Err(e) => warn!("{e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if health.mark_transport_disconnected() {
                        warn!("event bus connection lost: {e}");
                        if !send(&tx, PushEvent::Disconnected) {
                            break;
                        }
                    } else {
                        debug!("event bus still unreachable: {e}");
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
        info!("event bus listener stopped");
    })
}

/// Publishes `request_video_frame` without waiting; a full request queue drops the request.
/// Nothing is queued while the broker is unreachable.
#[derive(Clone)]
pub struct MqttFrameRequester {
    client: AsyncClient,
    topic: String,
    health: HealthTracker,
}

impl MqttFrameRequester {
    pub fn new(client: AsyncClient, topics: &Topics, health: HealthTracker) -> Self {
        Self { client, topic: topics.request_video_frame(), health }
    }
}

impl FrameRequester for MqttFrameRequester {
    fn request_frame(&self, device_id: &str) {
        if !self.health.is_transport_connected() {
            return;
        }
        let payload = match serde_json::to_vec(&DeviceRef { device_id: device_id.to_string() }) {
            Ok(p) => p,
            Err(e) => {
                error!("cannot encode frame request: {e}");
                return;
            }
        };
        if let Err(e) = self.client.try_publish(&self.topic, QoS::AtMostOnce, false, payload) {
            debug!(device_id, "frame request dropped: {e}");
        }
    }
}
