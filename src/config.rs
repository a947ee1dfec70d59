use serde::Deserialize;
use std::time::Duration;

use crate::aggregator::AggregatorConfig;
use crate::transport::ReconnectPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// REST base, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Streaming endpoint, e.g. `ws://localhost:8080/ws`.
    pub ws_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_prefix() -> String {
    "/api/v1".into()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl StreamConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Snapshots kept in the rolling history (oldest evicted first).
    #[serde(default = "default_snapshot_capacity")]
    pub snapshot_capacity: usize,
    /// Anomalies kept, newest first.
    #[serde(default = "default_anomaly_capacity")]
    pub anomaly_capacity: usize,
}

fn default_snapshot_capacity() -> usize {
    60
}

fn default_anomaly_capacity() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: default_snapshot_capacity(),
            anomaly_capacity: default_anomaly_capacity(),
        }
    }
}

impl HistoryConfig {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            history_capacity: self.snapshot_capacity,
            anomaly_capacity: self.anomaly_capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// How often the binary logs a one-line summary of the aggregated view.
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

fn default_summary_interval_secs() -> u64 {
    5
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.backend.base_url.starts_with("http://")
                || self.backend.base_url.starts_with("https://"),
            "backend.base_url must be an http(s) URL, got {:?}",
            self.backend.base_url
        );
        anyhow::ensure!(
            self.backend.ws_url.starts_with("ws://") || self.backend.ws_url.starts_with("wss://"),
            "backend.ws_url must be a ws(s) URL, got {:?}",
            self.backend.ws_url
        );
        anyhow::ensure!(
            self.backend.request_timeout_ms > 0,
            "backend.request_timeout_ms must be > 0, got {}",
            self.backend.request_timeout_ms
        );
        anyhow::ensure!(
            self.stream.reconnect_base_delay_ms > 0,
            "stream.reconnect_base_delay_ms must be > 0, got {}",
            self.stream.reconnect_base_delay_ms
        );
        anyhow::ensure!(
            self.stream.reconnect_max_delay_ms >= self.stream.reconnect_base_delay_ms,
            "stream.reconnect_max_delay_ms must be >= reconnect_base_delay_ms, got {} < {}",
            self.stream.reconnect_max_delay_ms,
            self.stream.reconnect_base_delay_ms
        );
        anyhow::ensure!(
            self.history.snapshot_capacity > 0,
            "history.snapshot_capacity must be > 0, got {}",
            self.history.snapshot_capacity
        );
        anyhow::ensure!(
            self.history.anomaly_capacity > 0,
            "history.anomaly_capacity must be > 0, got {}",
            self.history.anomaly_capacity
        );
        anyhow::ensure!(
            self.display.summary_interval_secs > 0,
            "display.summary_interval_secs must be > 0, got {}",
            self.display.summary_interval_secs
        );
        Ok(())
    }
}
