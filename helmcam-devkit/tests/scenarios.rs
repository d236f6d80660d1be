//! Dashboard scenarios: reconciler driven through the bus stub, commands
//! through the operator API against the fake receiver.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helmcam_dashboard::alerts::{signal_percent, AlertKind};
use helmcam_dashboard::commands::CommandClient;
use helmcam_dashboard::health::HealthTracker;
use helmcam_dashboard::http::{build_router, AppState};
use helmcam_dashboard::models::CameraEntry;
use helmcam_dashboard::poller::spawn_camera_poller;
use helmcam_dashboard::reconciler::{event_queue, Dashboard, ReconcilerSettings};
use helmcam_dashboard::render::SharedView;
use helmcam_devkit::{MockBus, MockReceiver, ReceiverMessageBuilder as Msg, TestHarness};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test(start_paused = true)]
async fn push_for_unknown_device_creates_it_with_low_battery() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -60.0))
        .unwrap()
        .reconcile();

    let d1 = harness.dashboard.registry().get("D1").unwrap();
    assert_eq!(d1.battery_percent, Some(15.0));
    assert!(d1.online);
    harness.assert_alerts("D1", &[AlertKind::LowBattery]).unwrap();

    let view = harness.device("D1").unwrap();
    assert_eq!(view.alerts.len(), 1);
    assert_eq!(view.alerts[0].label, "Low Battery");
}

#[tokio::test(start_paused = true)]
async fn pull_without_known_device_tears_it_down() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -95.0))
        .unwrap()
        .reconcile();
    harness.push("video_frame", Msg::video_frame("D1", b"jpeg")).unwrap().reconcile();
    assert_eq!(harness.view.surface_status("D1"), Some((1, false)));

    harness
        .pull(Msg::camera_list(vec![Msg::camera_entry("D2", 80.0, -70.0, false)]))
        .unwrap()
        .reconcile();

    harness.assert_torn_down("D1").unwrap();
    assert!(harness.device("D2").is_some());

    // late frame after teardown is discarded
    harness.push("video_frame", Msg::video_frame("D1", b"late")).unwrap().reconcile();
    assert!(harness.dashboard.registry().get("D1").is_none());
    assert_eq!(harness.view.surface_status("D1"), None);
}

#[tokio::test(start_paused = true)]
async fn device_survives_a_single_miss_with_threshold_two() {
    let settings = ReconcilerSettings { missed_pull_threshold: 2, ..Default::default() };
    let mut harness = TestHarness::with_settings(settings);
    harness.pull(Msg::camera_list(vec![Msg::camera_entry("D1", 80.0, -70.0, false)])).unwrap().reconcile();

    harness.pull(Msg::camera_list(vec![])).unwrap().reconcile();
    assert!(harness.device("D1").is_some());

    harness.pull_failed("connection refused").reconcile();
    assert!(harness.device("D1").is_some());

    harness.pull(Msg::camera_list(vec![])).unwrap().reconcile();
    harness.assert_torn_down("D1").unwrap();
}

#[tokio::test(start_paused = true)]
async fn same_tick_push_beats_pull() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 42.0, -65.0))
        .unwrap()
        .pull(Msg::camera_list(vec![Msg::camera_entry("D1", 90.0, -80.0, true)]))
        .unwrap()
        .reconcile();

    let d1 = harness.dashboard.registry().get("D1").unwrap();
    assert_eq!(d1.battery_percent, Some(42.0));
    assert_eq!(d1.signal_strength_dbm, Some(-65.0));
    // fields only the pull supplied still land
    assert!(d1.recording);
    assert_eq!(d1.channel, Some(1));
}

#[tokio::test(start_paused = true)]
async fn repeated_low_battery_is_deduplicated() {
    let mut harness = TestHarness::new();
    for _ in 0..2 {
        harness
            .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -60.0))
            .unwrap()
            .reconcile();
    }
    assert_eq!(harness.get_stats().active_alerts, 1);
}

#[tokio::test(start_paused = true)]
async fn alert_expires_after_ten_seconds_while_condition_persists() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -90.0))
        .unwrap()
        .reconcile();
    harness.assert_alerts("D1", &[AlertKind::LowBattery, AlertKind::WeakSignal]).unwrap();

    harness.advance(Duration::from_millis(9_999)).await;
    assert_eq!(harness.active_alerts("D1").len(), 2);

    harness.advance(Duration::from_millis(2)).await;
    harness.assert_alerts("D1", &[]).unwrap();
    assert!(harness.device("D1").unwrap().alerts.is_empty());
    assert_eq!(harness.dashboard.registry().get("D1").unwrap().battery_percent, Some(15.0));

    // a fresh update re-raises it
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -60.0))
        .unwrap()
        .reconcile();
    harness.assert_alerts("D1", &[AlertKind::LowBattery]).unwrap();
}

#[tokio::test(start_paused = true)]
async fn expired_alert_stays_cleared_until_fresh_telemetry() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -60.0))
        .unwrap()
        .reconcile();
    harness.advance(Duration::from_millis(10_001)).await;
    harness.assert_alerts("D1", &[]).unwrap();

    // same low battery through the camera list and a recording event
    harness
        .pull(Msg::camera_list(vec![Msg::camera_entry("D1", 15.0, -60.0, false)]))
        .unwrap()
        .reconcile();
    harness.assert_alerts("D1", &[]).unwrap();
    harness.push("recording_started", Msg::device_event("D1")).unwrap().reconcile();
    harness.assert_alerts("D1", &[]).unwrap();
    assert_eq!(harness.device("D1").unwrap().battery, "15%");

    harness
        .push("telemetry_update", Msg::telemetry_update("D1", 15.0, -60.0))
        .unwrap()
        .reconcile();
    harness.assert_alerts("D1", &[AlertKind::LowBattery]).unwrap();
}

#[tokio::test(start_paused = true)]
async fn absent_fields_read_unknown_and_raise_nothing() {
    let mut harness = TestHarness::new();
    harness.push("recording_started", Msg::device_event("D3")).unwrap().reconcile();

    let view = harness.device("D3").unwrap();
    assert!(view.recording);
    assert_eq!(view.battery, "unknown");
    assert_eq!(view.signal, "unknown");
    assert_eq!(view.signal_percent, None);
    harness.assert_alerts("D3", &[]).unwrap();
}

#[test]
fn signal_percent_mapping() {
    assert_eq!(signal_percent(-50.0), 100.0);
    assert_eq!(signal_percent(-90.0), 0.0);
    assert_eq!(signal_percent(-70.0), 50.0);
    assert_eq!(signal_percent(-20.0), 100.0);
    assert_eq!(signal_percent(-120.0), 0.0);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_shows_no_signal_then_removes() {
    let mut harness = TestHarness::new();
    harness
        .push("telemetry_update", Msg::telemetry_full("D1", 70.0, -60.0, 38.5, 4))
        .unwrap()
        .reconcile();
    assert_eq!(harness.device("D1").unwrap().temperature, "38.5°C");

    harness.push("camera_disconnected", Msg::device_event("D1")).unwrap().reconcile();
    harness.assert_torn_down("D1").unwrap();

    let issued = harness.bus.requests_for("D1");
    harness.advance(Duration::from_millis(500)).await;
    assert_eq!(harness.bus.requests_for("D1"), issued);
}

fn post(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn channel_nine_is_never_sent_to_the_receiver() {
    let receiver = MockReceiver::start().await.unwrap();
    receiver.set_cameras(vec![CameraEntry::new("D1")]);

    let (tx, rx) = event_queue();
    let view = SharedView::new();
    let health = HealthTracker::new();
    let commands = CommandClient::new(&receiver.url(), Some(Duration::from_secs(2))).unwrap();
    let dashboard = Dashboard::new(ReconcilerSettings::default(), Arc::new(MockBus::default()), Box::new(view.clone()));
    let reconciler = tokio::spawn(dashboard.run(rx));
    // one immediate refresh, the next one far beyond the test
    let poller = spawn_camera_poller(commands.clone(), Duration::from_secs(600), tx.clone(), health.clone());

    wait_for(|| view.snapshot().device("D1").is_some()).await;
    poller.abort();
    assert_eq!(view.snapshot().device("D1").unwrap().channel, "unknown");

    let router = build_router(AppState {
        view: view.clone(),
        health: health.clone(),
        commands: commands.clone(),
        events: tx.clone(),
    });
    let resp = router.clone().oneshot(post("/devices/D1/channel/9")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(receiver.command_calls().is_empty());

    let resp = router.clone().oneshot(post("/devices/D1/channel/3")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // accepted change refreshes the camera list right away
    wait_for(|| view.snapshot().device("D1").is_some_and(|d| d.channel == "3")).await;

    let resp = router.oneshot(post("/devices/D1/recording/toggle")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(receiver.command_calls(), vec!["/api/channel/set/D1/3", "/api/recording/start/D1"]);

    // receiver drops D1: the next refresh removes it
    receiver.set_cameras(vec![]);
    let poller = spawn_camera_poller(commands, Duration::from_secs(600), tx, health);
    wait_for(|| view.snapshot().device("D1").is_none()).await;

    poller.abort();
    reconciler.abort();
}

#[tokio::test]
async fn rejected_command_is_reported_not_retried() {
    let receiver = MockReceiver::start().await.unwrap();
    receiver.reject_commands(Some("Camera not found"));

    let (tx, _rx) = event_queue();
    let view = SharedView::new();
    let mut dashboard = Dashboard::new(ReconcilerSettings::default(), Arc::new(MockBus::default()), Box::new(view.clone()));
    dashboard.apply_batch(vec![MockBus::default()
        .incoming("recording_started", &Msg::device_event("D1"))
        .unwrap()]);

    let router = build_router(AppState {
        view,
        health: HealthTracker::new(),
        commands: CommandClient::new(&receiver.url(), Some(Duration::from_secs(2))).unwrap(),
        events: tx,
    });
    let resp = router.oneshot(post("/devices/D1/recording/toggle")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(receiver.command_calls(), vec!["/api/recording/stop/D1"]);
    dashboard.shutdown();
}
