/**
 * OPERATOR API - Local HTTP surface of the dashboard
 *
 * ROLE: exposes the rendered dashboard state and forwards operator actions
 * (recording toggle, channel change, telemetry refresh) to the receiver.
 *
 * - Reads come from the last published view; nothing here touches the registry.
 * - Command failures are reported as `{ "success": false, "error": ... }`.
 * - A refreshed telemetry reading goes back through the reconciler queue, and
 *   so does the camera list fetched after an accepted channel change.
 */

use crate::commands::{CommandClient, CommandError};
use crate::health::{DashboardHealth, HealthTracker};
use crate::reconciler::{DashboardEvent, EventSender, PullOutcome, Stamped};
use crate::render::{DashboardView, DeviceView, SharedView};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub view: SharedView,
    pub health: HealthTracker,
    pub commands: CommandClient,
    pub events: EventSender,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/dashboard", get(get_dashboard))
        .route("/devices/{id}", get(get_device))
        .route("/devices/{id}/recording/toggle", post(toggle_recording))
        .route("/devices/{id}/channel/{channel}", post(set_channel))
        .route("/devices/{id}/telemetry/refresh", post(refresh_telemetry))
        .with_state(app_state)
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommandError::InvalidChannel(_) => StatusCode::BAD_REQUEST,
            CommandError::NotFound(_) => StatusCode::NOT_FOUND,
            CommandError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            CommandError::Http(_) | CommandError::Rejected(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<DashboardHealth> {
    Json(app.health.get_health())
}

// GET /dashboard
async fn get_dashboard(State(app): State<AppState>) -> Json<DashboardView> {
    Json(app.view.snapshot())
}

// GET /devices/{id}
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    let view = app.view.snapshot();
    let Some(device) = view.device(&id) else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(device.clone()))
}

// POST /devices/{id}/recording/toggle
async fn toggle_recording(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    let recording = app
        .view
        .snapshot()
        .device(&id)
        .map(|d| d.recording)
        .ok_or_else(|| CommandError::NotFound(id.clone()).into_response())?;
    let requested = app
        .commands
        .toggle_recording(&id, recording)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(json!({ "success": true, "recording": requested })))
}

// POST /devices/{id}/channel/{channel}
async fn set_channel(
    State(app): State<AppState>,
    Path((id, channel)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, CommandError> {
    let channel = app.commands.set_channel(&id, &channel).await?;
    refresh_cameras(&app).await;
    Ok(Json(json!({ "success": true, "channel": channel })))
}

/// Out-of-cycle camera list refresh; a failure leaves it to the next poll.
async fn refresh_cameras(app: &AppState) {
    let outcome = match app.commands.list_cameras().await {
        Ok(list) => {
            app.health.record_pull(true);
            PullOutcome::Snapshot(list.cameras)
        }
        Err(e) => {
            app.health.record_pull(false);
            warn!("camera refresh after command failed: {e}");
            return;
        }
    };
    if app.events.send(Stamped::now(DashboardEvent::Pull(outcome))).is_err() {
        warn!("reconciler gone, camera refresh dropped");
    }
}

// POST /devices/{id}/telemetry/refresh
async fn refresh_telemetry(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CommandError> {
    let reading = app.commands.fetch_telemetry(&id).await?;
    let event = DashboardEvent::TelemetryFetched { device_id: id.clone(), reading: reading.clone() };
    if app.events.send(Stamped::now(event)).is_err() {
        warn!(device_id = %id, "reconciler gone, telemetry reading dropped");
    }
    Ok(Json(json!({ "success": true, "telemetry": reading })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceSnapshot;
    use crate::reconciler::{event_queue, EventReceiver};
    use crate::render::RenderLayer;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, SharedView, EventReceiver) {
        let view = SharedView::new();
        let (tx, rx) = event_queue();
        let state = AppState {
            view: view.clone(),
            health: HealthTracker::new(),
            commands: CommandClient::new("http://127.0.0.1:9", Some(Duration::from_millis(200))).unwrap(),
            events: tx,
        };
        (build_router(state), view, rx)
    }

    fn publish_one(view: &SharedView, id: &str) {
        let mut snapshot = DeviceSnapshot::new(id);
        snapshot.battery_percent = Some(55.0);
        let device = DeviceView::build(&snapshot, &[]);
        let mut layer = view.clone();
        layer.render(&DashboardView { connected: true, active_cameras: 1, recording_count: 0, devices: vec![device] });
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_dashboard() {
        let (router, view, _rx) = app();
        publish_one(&view, "D1");

        let resp = router.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router.clone().oneshot(get("/system/health")).await.unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["transport_status"], "connecting");

        let resp = router.oneshot(get("/dashboard")).await.unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["active_cameras"], 1);
        assert_eq!(body["devices"][0]["battery"], "55%");
        assert_eq!(body["devices"][0]["signal"], "unknown");
    }

    #[tokio::test]
    async fn test_device_lookup() {
        let (router, view, _rx) = app();
        publish_one(&view, "D1");

        let resp = router.clone().oneshot(get("/devices/D1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["device_id"], "D1");

        let resp = router.oneshot(get("/devices/D9")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_channel_is_refused_locally() {
        let (router, view, _rx) = app();
        publish_one(&view, "D1");

        let resp = router.oneshot(post("/devices/D1/channel/9")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("invalid channel 9"));
    }

    #[tokio::test]
    async fn test_toggle_unknown_device() {
        let (router, _view, _rx) = app();
        let resp = router.oneshot(post("/devices/D9/recording/toggle")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_receiver_is_bad_gateway() {
        let (router, view, mut rx) = app();
        publish_one(&view, "D1");

        let resp = router.oneshot(post("/devices/D1/telemetry/refresh")).await.unwrap();
        assert!(resp.status() == StatusCode::BAD_GATEWAY || resp.status() == StatusCode::GATEWAY_TIMEOUT);
        assert!(rx.try_recv().is_err());
    }
}
