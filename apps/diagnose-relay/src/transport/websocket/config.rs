use url::Url;

use crate::transport::ConnectionError;

/// Where the backend channel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    pub host: String,
    pub port: u16,
    /// Optional path suffix (e.g. "/events")
    pub path: Option<String>,
    /// Whether to use TLS (wss:// vs ws://)
    pub use_tls: bool,
}

impl WebSocketConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: None,
            use_tls: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Build the full WebSocket URL
    pub fn build_url(&self) -> Result<Url, ConnectionError> {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let mut host = self.host.trim().to_string();

        // Normalize localhost to avoid IPv6 issues
        if host == "localhost" {
            host = "127.0.0.1".to_string();
        }
        if host.contains(':') && !host.starts_with('[') {
            host = format!("[{host}]");
        }

        let raw = format!("{scheme}://{host}:{}", self.port);
        let mut url = Url::parse(&raw).map_err(|source| ConnectionError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;

        if let Some(path) = self.path.as_deref() {
            let path = path.trim();
            if !path.is_empty() {
                if path.starts_with('/') {
                    url.set_path(path);
                } else {
                    url.set_path(&format!("/{path}"));
                }
            }
        }

        Ok(url)
    }
}
