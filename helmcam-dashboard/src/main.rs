/**
 * HELMCAM DASHBOARD - Entry point
 *
 * ROLE: wires the event bus listener, the camera refresh poller and the timer
 * into the reconciler queue, then serves the operator API until Ctrl-C.
 */

use anyhow::Context;
use helmcam_dashboard::commands::CommandClient;
use helmcam_dashboard::config::load_config;
use helmcam_dashboard::health::HealthTracker;
use helmcam_dashboard::http::{build_router, AppState};
use helmcam_dashboard::poller::{spawn_camera_poller, spawn_ticker};
use helmcam_dashboard::reconciler::{event_queue, Dashboard, ReconcilerSettings};
use helmcam_dashboard::render::SharedView;
use helmcam_dashboard::transport::{create_mqtt_client, spawn_mqtt_listener, MqttFrameRequester, Topics};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("helmcam_dashboard=info")),
        )
        .init();

    let cfg = load_config().await;
    info!(server = %cfg.server_url, broker = %cfg.mqtt.host, "starting dashboard");

    let health = HealthTracker::new();
    let (tx, rx) = event_queue();

    // push channel
    let topics = Topics::new(&cfg.mqtt.topic_prefix);
    let (mqtt_client, eventloop) = create_mqtt_client(&cfg.mqtt);
    let requester = Arc::new(MqttFrameRequester::new(mqtt_client.clone(), &topics, health.clone()));
    let listener_task = spawn_mqtt_listener(mqtt_client.clone(), eventloop, topics, tx.clone(), health.clone());

    // pull channel + timer
    let commands = CommandClient::from_config(&cfg).context("building receiver client")?;
    let poller_task = spawn_camera_poller(
        commands.clone(),
        Duration::from_millis(cfg.poll_interval_ms),
        tx.clone(),
        health.clone(),
    );
    let ticker_task = spawn_ticker(Duration::from_millis(cfg.tick_interval_ms), tx.clone());

    let view = SharedView::new();
    let dashboard = Dashboard::new(ReconcilerSettings::from(&cfg), requester, Box::new(view.clone()))
        .with_health(health.clone());
    let reconciler = tokio::spawn(dashboard.run(rx));

    let app = build_router(AppState { view, health, commands, events: tx });
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    info!("operator api on http://{}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("operator api failed")?;

    // producers hold the remaining senders; the reconciler stops once they are gone
    listener_task.abort();
    poller_task.abort();
    ticker_task.abort();
    if let Err(e) = mqtt_client.try_disconnect() {
        debug!("event bus disconnect: {e}");
    }
    reconciler.await.context("reconciler task panicked")?;
    info!("dashboard stopped");
    Ok(())
}
