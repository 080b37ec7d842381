use thiserror::Error;

use crate::consumer::TickInterval;
use crate::transport::websocket::WebSocketConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_INTERVAL_MS: u64 = crate::consumer::DEFAULT_PERIOD_MS;

/// Relay configuration: where the backend lives and how fast to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub path: Option<String>,
    pub use_tls: bool,
    pub interval: TickInterval,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend host cannot be empty")]
    EmptyHost,
    #[error("consumption interval must be greater than zero")]
    ZeroInterval,
}

impl RelayConfig {
    pub fn new(host: &str, port: u16, interval_ms: u64) -> Result<Self, ConfigError> {
        let host = normalize_host(host)?;
        let interval = TickInterval::from_millis(interval_ms).ok_or(ConfigError::ZeroInterval)?;
        Ok(Self {
            host,
            port,
            path: None,
            use_tls: false,
            interval,
        })
    }

    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path.filter(|path| !path.trim().is_empty());
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn websocket(&self) -> WebSocketConfig {
        let config = WebSocketConfig::new(self.host.clone(), self.port).with_tls(self.use_tls);
        match self.path.as_deref() {
            Some(path) => config.with_path(path),
            None => config,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: None,
            use_tls: false,
            interval: TickInterval::default(),
        }
    }
}

// Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
fn normalize_host(host: &str) -> Result<String, ConfigError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ConfigError::EmptyHost);
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(DEFAULT_HOST.to_string());
    }
    Ok(host.to_string())
}
