use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub price_feed: PriceFeedConfig,
    pub trading: TradingConfig,
    pub logging: LoggingConfig,
}

/// Where the trading backend lives and how long to wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Root of the REST API, e.g. "http://localhost:8080/api". All endpoint
    /// paths are appended to it.
    pub base_url: String,
    /// Per-request timeout for the REST calls. The price stream is exempt.
    pub request_timeout_ms: u64,
}

/// Parameters for the live price feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceFeedConfig {
    /// Period of the polling fallback.
    pub poll_interval_ms: u64,
    /// When false the controller skips the push stream and polls from the start.
    pub use_stream: bool,
}

/// Parameters for the trade panel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// How long trade feedback stays visible (and the panel stays busy) after a trade settles.
    pub feedback_clear_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            use_stream: true,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self { feedback_clear_ms: 3_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PriceFeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TradingConfig {
    pub fn feedback_clear_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_clear_ms)
    }
}

impl Config {
    /// Rejects settings that would stall the desk or point it nowhere.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "backend.base_url '{}' is not a valid URL: {}",
                self.backend.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "backend.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(positive("backend.request_timeout_ms"));
        }
        if self.price_feed.poll_interval_ms == 0 {
            return Err(positive("price_feed.poll_interval_ms"));
        }
        if self.trading.feedback_clear_ms == 0 {
            return Err(positive("trading.feedback_clear_ms"));
        }
        Ok(())
    }
}

fn positive(key: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{key} must be greater than zero"))
}
