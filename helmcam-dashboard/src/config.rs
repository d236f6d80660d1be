use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Receiver REST base URL (`/api/cameras`, `/api/recording/...`).
    pub server_url: String,
    pub mqtt: MqttConf,
    /// Local operator API.
    pub listen_addr: String,
    pub poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub missed_pull_threshold: u32,
    pub alert_ttl_ms: u64,
    pub frame_interval_ms: u64,
    /// `null` disables the idle placeholder.
    pub no_signal_after_ms: Option<u64>,
    /// `null` waits on commands forever.
    pub command_timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic_prefix: "helmcam".into(),
            keep_alive_secs: 15,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            mqtt: MqttConf::default(),
            listen_addr: "0.0.0.0:8090".into(),
            poll_interval_ms: 5_000,
            tick_interval_ms: 250,
            missed_pull_threshold: 1,
            alert_ttl_ms: 10_000,
            frame_interval_ms: 33,
            no_signal_after_ms: Some(3_000),
            command_timeout_ms: Some(5_000),
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.missed_pull_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "missed_pull_threshold",
                reason: "must be at least 1".into(),
            });
        }
        for (field, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("frame_interval_ms", self.frame_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be positive".into() });
            }
        }
        Ok(())
    }
}

/// Empty text yields the defaults.
pub fn parse_config(txt: &str) -> Result<DashboardConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(DashboardConfig::default());
    }
    let cfg: DashboardConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config_from(path: &Path) -> DashboardConfig {
    let mut cfg = if path.exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("{}: {e}, using defaults", path.display());
            DashboardConfig::default()
        })
    } else {
        info!("no {}, using default config", path.display());
        DashboardConfig::default()
    };

    if let Ok(url) = std::env::var("HELMCAM_SERVER_URL") {
        if !url.trim().is_empty() {
            cfg.server_url = url;
        }
    }
    cfg
}

pub async fn load_config() -> DashboardConfig {
    let path = std::env::var("HELMCAM_DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.yaml".into());
    load_config_from(Path::new(&path)).await
}
