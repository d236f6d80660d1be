//! REST client for the receiver: camera list, telemetry lookups and the
//! operator commands (recording toggle, RF channel selection).
//!
//! Commands are never retried. Channel numbers are validated before any
//! request leaves the process.

use crate::config::DashboardConfig;
use crate::models::{CameraList, CommandAck, TelemetryReading};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{info, warn};

pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 8;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid channel {0}, expected 1-8")]
    InvalidChannel(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("receiver rejected the command: {0}")]
    Rejected(String),
    #[error("unknown device {0}")]
    NotFound(String),
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Http(e) if e.is_timeout())
    }
}

/// Accepts "1".."8"; anything else is refused without a request.
pub fn validate_channel(raw: &str) -> Result<u8, CommandError> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|c| (MIN_CHANNEL..=MAX_CHANNEL).contains(c))
        .ok_or_else(|| CommandError::InvalidChannel(raw.to_string()))
}

#[derive(Clone)]
pub struct CommandClient {
    http: Client,
    base_url: Url,
}

impl CommandClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, CommandError> {
        let base_url = Url::parse(base_url).map_err(|e| CommandError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(CommandError::InvalidUrl(base_url.to_string()));
        }
        let mut builder = Client::builder().user_agent(concat!("helmcam-dashboard/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()?, base_url })
    }

    pub fn from_config(cfg: &DashboardConfig) -> Result<Self, CommandError> {
        Self::new(&cfg.server_url, cfg.command_timeout_ms.map(Duration::from_millis))
    }

    /// `{base}/api/<segments...>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    async fn post_command(&self, segments: &[&str]) -> Result<(), CommandError> {
        let resp = self.http.post(self.endpoint(segments)).send().await?;
        let status = resp.status();
        // failures come back as JSON too, with a 4xx/5xx status
        let ack = resp.json::<CommandAck>().await.ok();
        match ack {
            Some(CommandAck { success: true, .. }) if status.is_success() => Ok(()),
            Some(CommandAck { error: Some(reason), .. }) => Err(CommandError::Rejected(reason)),
            _ => Err(CommandError::Rejected(format!("HTTP {status}"))),
        }
    }

    pub async fn start_recording(&self, device_id: &str) -> Result<(), CommandError> {
        self.post_command(&["recording", "start", device_id]).await?;
        info!(device_id, "recording start requested");
        Ok(())
    }

    pub async fn stop_recording(&self, device_id: &str) -> Result<(), CommandError> {
        self.post_command(&["recording", "stop", device_id]).await?;
        info!(device_id, "recording stop requested");
        Ok(())
    }

    /// Starts or stops depending on the displayed state; returns the requested state.
    pub async fn toggle_recording(&self, device_id: &str, currently_recording: bool) -> Result<bool, CommandError> {
        let result = if currently_recording {
            self.stop_recording(device_id).await
        } else {
            self.start_recording(device_id).await
        };
        if let Err(e) = &result {
            warn!(device_id, "recording toggle failed: {e}");
        }
        result.map(|_| !currently_recording)
    }

    pub async fn set_channel(&self, device_id: &str, channel: &str) -> Result<u8, CommandError> {
        let channel = validate_channel(channel)?;
        let channel_segment = channel.to_string();
        if let Err(e) = self.post_command(&["channel", "set", device_id, &channel_segment]).await {
            warn!(device_id, channel, "channel change failed: {e}");
            return Err(e);
        }
        info!(device_id, channel, "channel set");
        Ok(channel)
    }

    pub async fn fetch_telemetry(&self, device_id: &str) -> Result<TelemetryReading, CommandError> {
        let resp = self.http.get(self.endpoint(&["telemetry", device_id])).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CommandError::NotFound(device_id.to_string()));
        }
        Ok(resp.error_for_status()?.json::<TelemetryReading>().await?)
    }

    pub async fn list_cameras(&self) -> Result<CameraList, CommandError> {
        let resp = self.http.get(self.endpoint(&["cameras"])).send().await?;
        Ok(resp.error_for_status()?.json::<CameraList>().await?)
    }
}
