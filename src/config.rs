//! Configuration module for the order book stream

use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::StreamError;
use crate::websocket::MAX_BACKOFF_EXPONENT;

/// Application configuration
#[derive(Clone, Deserialize)]
pub struct Config {
    /// API key id sent in the handshake
    pub api_key_id: String,

    /// API key secret sent in the handshake
    pub api_key_secret: String,

    /// Market pair to stream (e.g., "XBTZAR")
    pub pair: String,

    /// Streaming API host
    pub ws_endpoint: String,

    /// Interval between keep-alive frames
    pub keepalive_interval_ms: u64,

    /// Fail the session when no frame arrives for this long; 0 disables
    pub read_timeout_ms: u64,

    /// Reconnection settings
    pub backoff_base_ms: u64,
    pub backoff_max_exponent: u32,
    pub attempt_decay_secs: u64,

    /// Status log interval in seconds
    pub status_interval_secs: u64,

    /// Port of the health check server
    pub health_port: u16,
}

const DEFAULT_WS_ENDPOINT: &str = "wss://ws.luno.com";
const DEFAULT_PAIR: &str = "XBTZAR";

impl Config {
    /// Configuration for one pair with default settings
    pub fn new(api_key_id: &str, api_key_secret: &str, pair: &str) -> Self {
        Self {
            api_key_id: api_key_id.to_string(),
            api_key_secret: api_key_secret.to_string(),
            pair: pair.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            api_key_id: env::var("LUNO_API_KEY_ID").unwrap_or_default(),
            api_key_secret: env::var("LUNO_API_KEY_SECRET").unwrap_or_default(),
            pair: env::var("PAIR")
                .map(|p| p.trim().to_uppercase())
                .unwrap_or_else(|_| DEFAULT_PAIR.to_string()),
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_WS_ENDPOINT.to_string()),
            keepalive_interval_ms: env_or("KEEPALIVE_INTERVAL_MS", defaults.keepalive_interval_ms),
            read_timeout_ms: env_or("READ_TIMEOUT_MS", defaults.read_timeout_ms),
            backoff_base_ms: env_or("BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_max_exponent: env_or("BACKOFF_MAX_EXPONENT", defaults.backoff_max_exponent),
            attempt_decay_secs: env_or("ATTEMPT_DECAY_SECS", defaults.attempt_decay_secs),
            status_interval_secs: env_or("STATUS_INTERVAL_SECS", defaults.status_interval_secs),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the stream cannot run with
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.api_key_id.is_empty() || self.api_key_secret.is_empty() {
            return Err(StreamError::ConfigError(
                "LUNO_API_KEY_ID and LUNO_API_KEY_SECRET must be set".to_string(),
            ));
        }
        if self.pair.is_empty() {
            return Err(StreamError::ConfigError("PAIR must not be empty".to_string()));
        }
        if self.keepalive_interval_ms == 0 || self.backoff_base_ms == 0 {
            return Err(StreamError::ConfigError(
                "KEEPALIVE_INTERVAL_MS and BACKOFF_BASE_MS must be positive".to_string(),
            ));
        }
        if self.backoff_max_exponent > MAX_BACKOFF_EXPONENT {
            return Err(StreamError::ConfigError(format!(
                "BACKOFF_MAX_EXPONENT must be at most {MAX_BACKOFF_EXPONENT}"
            )));
        }
        Ok(())
    }

    /// Full stream URL for the configured pair
    pub fn stream_url(&self) -> String {
        format!(
            "{}/api/1/stream/{}",
            self.ws_endpoint.trim_end_matches('/'),
            self.pair
        )
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key_id: String::new(),
            api_key_secret: String::new(),
            pair: DEFAULT_PAIR.to_string(),
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            keepalive_interval_ms: 60_000,
            read_timeout_ms: 0,
            backoff_base_ms: 5_000,
            backoff_max_exponent: 5,
            attempt_decay_secs: 3_600,
            status_interval_secs: 30,
            health_port: 9090,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .field("pair", &self.pair)
            .field("ws_endpoint", &self.ws_endpoint)
            .field("keepalive_interval_ms", &self.keepalive_interval_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_max_exponent", &self.backoff_max_exponent)
            .field("attempt_decay_secs", &self.attempt_decay_secs)
            .field("status_interval_secs", &self.status_interval_secs)
            .field("health_port", &self.health_port)
            .finish()
    }
}
