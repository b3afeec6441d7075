//! Application configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file
//! (or no file at all) yields a runnable configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vex_detector::DetectorConfig;
use vex_registry::{ClientConfig, UniverseFilter};
use vex_ws::ConnectionConfig;

/// Extra request header, sent with REST calls and the stream handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

/// REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// In-flight request cap per host.
    #[serde(default = "default_max_per_host")]
    pub max_per_host: usize,
    #[serde(default)]
    pub header: Option<HeaderConfig>,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_per_host() -> usize {
    40
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_per_host: default_max_per_host(),
            header: None,
        }
    }
}

/// Streaming session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Ping interval. Staleness is 1.5x this.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_subscribe_batch")]
    pub subscribe_batch: usize,
    #[serde(default = "default_unsubscribe_batch")]
    pub unsubscribe_batch: usize,
    #[serde(default = "default_batch_pace_ms")]
    pub batch_pace_ms: u64,
}

fn default_channel() -> String {
    "candle1H".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    20_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_subscribe_batch() -> usize {
    40
}

fn default_unsubscribe_batch() -> usize {
    50
}

fn default_batch_pace_ms() -> u64 {
    50
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            subscribe_batch: default_subscribe_batch(),
            unsubscribe_batch: default_unsubscribe_batch(),
            batch_pace_ms: default_batch_pace_ms(),
        }
    }
}

/// Pool synchronizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay before the first cycle.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Cooldown after a failed cycle.
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Maximum absolute 24h change, as a fraction.
    #[serde(default = "default_max_change_24h")]
    pub max_change_24h: f64,
    #[serde(default = "default_stablecoin_bases")]
    pub stablecoin_bases: Vec<String>,
    #[serde(default = "default_inst_type")]
    pub inst_type: String,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_period_secs() -> u64 {
    300
}

fn default_retry_secs() -> u64 {
    30
}

fn default_pool_size() -> usize {
    120
}

fn default_max_change_24h() -> f64 {
    0.30
}

fn default_stablecoin_bases() -> Vec<String> {
    ["USDT", "USDC", "DAI", "FDUSD", "TUSD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_inst_type() -> String {
    "SWAP".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            period_secs: default_period_secs(),
            retry_secs: default_retry_secs(),
            pool_size: default_pool_size(),
            max_change_24h: default_max_change_24h(),
            stablecoin_bases: default_stablecoin_bases(),
            inst_type: default_inst_type(),
        }
    }
}

impl SyncConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

/// Backfill fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Permits in the backfill pool.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    /// Delay between admissions.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
    #[serde(default = "default_bar")]
    pub bar: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_max_inflight() -> usize {
    40
}

fn default_pace_ms() -> u64 {
    50
}

fn default_bar() -> String {
    "1H".to_string()
}

fn default_limit() -> u32 {
    30
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_inflight: default_max_inflight(),
            pace_ms: default_pace_ms(),
            bar: default_bar(),
            limit: default_limit(),
        }
    }
}

impl BackfillConfig {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Candle stream endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// REST API base, e.g. "https://www.okx.com/api/v5".
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    "wss://ws.okx.com:8443/ws/v5/business".to_string()
}

fn default_rest_base_url() -> String {
    "https://www.okx.com/api/v5".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            rest_base_url: default_rest_base_url(),
            http: HttpConfig::default(),
            websocket: WsConfig::default(),
            sync: SyncConfig::default(),
            backfill: BackfillConfig::default(),
            detector: DetectorConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Like [`from_file`](Self::from_file), but a missing file falls back
    /// to defaults. A file that exists but does not parse is still an error.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn validate(&self) -> AppResult<()> {
        let ws = &self.websocket;
        if ws.subscribe_batch == 0 || ws.unsubscribe_batch == 0 {
            return Err(AppError::Config(
                "websocket batch sizes must be positive".to_string(),
            ));
        }
        if ws.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "websocket.heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.backfill.max_inflight == 0 || self.http.max_per_host == 0 {
            return Err(AppError::Config(
                "backfill.max_inflight and http.max_per_host must be positive".to_string(),
            ));
        }
        if self.sync.pool_size == 0 {
            return Err(AppError::Config("sync.pool_size must be positive".to_string()));
        }
        if self.sync.period_secs == 0 {
            return Err(AppError::Config("sync.period_secs must be positive".to_string()));
        }
        if !(self.sync.max_change_24h > 0.0) {
            return Err(AppError::Config(
                "sync.max_change_24h must be positive".to_string(),
            ));
        }
        self.detector.validate()?;
        Ok(())
    }

    fn extra_header(&self) -> Option<(String, String)> {
        self.http
            .header
            .as_ref()
            .map(|h| (h.name.clone(), h.value.clone()))
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.ws_url.clone(),
            channel: self.websocket.channel.clone(),
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            reconnect_delay_ms: self.websocket.reconnect_delay_ms,
            subscribe_batch: self.websocket.subscribe_batch,
            unsubscribe_batch: self.websocket.unsubscribe_batch,
            batch_pace_ms: self.websocket.batch_pace_ms,
            extra_header: self.extra_header(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.rest_base_url.clone(),
            timeout: Duration::from_secs(self.http.timeout_secs),
            max_per_host: self.http.max_per_host,
            extra_header: self.extra_header(),
        }
    }

    pub fn universe_filter(&self) -> AppResult<UniverseFilter> {
        let max_change_24h = Decimal::try_from(self.sync.max_change_24h).map_err(|e| {
            AppError::Config(format!("sync.max_change_24h is not representable: {e}"))
        })?;
        Ok(UniverseFilter {
            pool_size: self.sync.pool_size,
            max_change_24h,
            stablecoin_bases: self.sync.stablecoin_bases.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.ws_url, "wss://ws.okx.com:8443/ws/v5/business");
        assert_eq!(config.websocket.heartbeat_interval_ms, 20_000);
        assert_eq!(config.websocket.subscribe_batch, 40);
        assert_eq!(config.websocket.unsubscribe_batch, 50);
        assert_eq!(config.sync.pool_size, 120);
        assert_eq!(config.sync.retry_secs, 30);
        assert_eq!(config.backfill.max_inflight, 40);
        assert_eq!(config.backfill.limit, 30);
        assert_eq!(config.detector.ver_threshold, 3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            ws_url = "ws://127.0.0.1:9000"

            [http.header]
            name = "x-simulated-trading"
            value = "1"

            [sync]
            pool_size = 10

            [detector]
            ver_threshold = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.pool_size, 10);
        assert_eq!(config.sync.period_secs, 300);
        assert_eq!(config.detector.watch_ratio, 0.7);

        let conn = config.connection_config();
        assert_eq!(conn.url, "ws://127.0.0.1:9000");
        assert_eq!(
            conn.extra_header,
            Some(("x-simulated-trading".to_string(), "1".to_string()))
        );
        assert_eq!(config.client_config().extra_header, conn.extra_header);
    }

    #[test]
    fn test_universe_filter_conversion() {
        let filter = AppConfig::default().universe_filter().unwrap();
        assert_eq!(filter.pool_size, 120);
        assert_eq!(filter.max_change_24h, dec!(0.3));
        assert!(filter.stablecoin_bases.contains(&"USDC".to_string()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.websocket.subscribe_batch = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.backfill.max_inflight = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detector.ver_threshold = 0.0;
        assert!(matches!(config.validate(), Err(AppError::Detector(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/vexwatch.toml").unwrap();
        assert_eq!(config.sync.pool_size, 120);
    }

    #[test]
    fn test_from_file_parse_error() {
        let path = std::env::temp_dir().join(format!("vex-config-{}.toml", std::process::id()));
        std::fs::write(&path, "ws_url = [").unwrap();
        let result = AppConfig::from_file(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
