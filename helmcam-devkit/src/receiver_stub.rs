/*!
In-process fake of the receiver's REST API.

Serves `/api/cameras`, `/api/telemetry/{id}` and the recording/channel
commands on an ephemeral local port and records every request it gets.
*/

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use helmcam_dashboard::models::{CameraEntry, CameraList, TelemetryReading};
use helmcam_dashboard::render::Shared;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
}

#[derive(Clone, Default)]
struct ReceiverState {
    cameras: Shared<Vec<CameraEntry>>,
    telemetry: Shared<HashMap<String, TelemetryReading>>,
    calls: Shared<Vec<RecordedCall>>,
    reject_with: Shared<Option<String>>,
}

impl ReceiverState {
    fn record(&self, method: &'static str, uri: &Uri) {
        self.calls.lock().push(RecordedCall { method, path: uri.path().to_string() });
    }

    fn ack(&self) -> (StatusCode, Json<Value>) {
        match self.reject_with.lock().clone() {
            Some(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": error })),
            ),
            None => (StatusCode::OK, Json(json!({ "success": true }))),
        }
    }
}

pub struct MockReceiver {
    addr: SocketAddr,
    state: ReceiverState,
    server: JoinHandle<()>,
}

impl MockReceiver {
    pub async fn start() -> Result<Self> {
        let state = ReceiverState::default();
        let app = Router::new()
            .route("/api/cameras", get(list_cameras))
            .route("/api/telemetry/{id}", get(get_telemetry))
            .route("/api/recording/{action}/{id}", post(recording))
            .route("/api/channel/set/{id}/{channel}", post(set_channel))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("mock receiver stopped: {e}");
            }
        });
        Ok(Self { addr, state, server })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_cameras(&self, cameras: Vec<CameraEntry>) {
        *self.state.cameras.lock() = cameras;
    }

    pub fn set_telemetry(&self, device_id: &str, reading: TelemetryReading) {
        self.state.telemetry.lock().insert(device_id.to_string(), reading);
    }

    /// Makes every command fail with `{ "success": false, "error": reason }`.
    pub fn reject_commands(&self, reason: Option<&str>) {
        *self.state.reject_with.lock() = reason.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    /// POSTs only; camera list refreshes are left out.
    pub fn command_calls(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.method == "POST").map(|c| c.path).collect()
    }
}

impl Drop for MockReceiver {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn list_cameras(State(state): State<ReceiverState>, uri: Uri) -> Json<CameraList> {
    state.record("GET", &uri);
    Json(CameraList { cameras: state.cameras.lock().clone() })
}

async fn get_telemetry(
    State(state): State<ReceiverState>,
    Path(id): Path<String>,
    uri: Uri,
) -> Result<Json<TelemetryReading>, (StatusCode, Json<Value>)> {
    state.record("GET", &uri);
    let reading = state.telemetry.lock().get(&id).cloned();
    reading
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "error": "Camera not found" }))))
}

async fn recording(
    State(state): State<ReceiverState>,
    Path((action, _id)): Path<(String, String)>,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    state.record("POST", &uri);
    if action != "start" && action != "stop" {
        return (StatusCode::NOT_FOUND, Json(json!({ "success": false, "error": "unknown action" })));
    }
    state.ack()
}

async fn set_channel(
    State(state): State<ReceiverState>,
    Path((id, channel)): Path<(String, u8)>,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    state.record("POST", &uri);
    if !(1..=8).contains(&channel) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "error": "Invalid channel" })));
    }
    let (status, body) = state.ack();
    if status.is_success() {
        // the camera list reflects an accepted change
        if let Some(camera) = state.cameras.lock().iter_mut().find(|c| c.device_id == id) {
            camera.channel = Some(channel);
        }
    }
    (status, body)
}
