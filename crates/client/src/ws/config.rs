//! Connection settings.

use std::time::Duration;

use furioso_shared::{RealtimeError, WS_AUTH_PATH, WS_PATH};
use url::Url;

use super::reconnect::ReconnectConfig;

/// Settings for a [`WsClient`](super::WsClient).
#[derive(Debug, Clone, PartialEq)]
pub struct WsConfig {
    /// Origin of the hosting page, e.g. `https://qg.furia.gg`
    pub origin: String,
    pub ws_path: String,
    pub auth_path: String,
    /// Cookie header for native callers; browsers attach the session cookie themselves
    pub session_cookie: Option<String>,
    pub auth_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            ws_path: WS_PATH.to_string(),
            auth_path: WS_AUTH_PATH.to_string(),
            session_cookie: None,
            auth_timeout: Duration::from_millis(5000),
            keepalive_interval: Duration::from_millis(30000),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl WsConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Read settings from the environment.
    ///
    /// Environment variables:
    /// - `FURIOSO_BASE_URL`: page origin (default: "http://localhost:8080")
    /// - `FURIOSO_SESSION_COOKIE`: cookie header sent on the auth side channel
    /// - `FURIOSO_WS_PATH`: realtime endpoint path (default: "/ws")
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(origin) = std::env::var("FURIOSO_BASE_URL") {
            config.origin = origin;
        }
        config.session_cookie = std::env::var("FURIOSO_SESSION_COOKIE")
            .ok()
            .filter(|c| !c.trim().is_empty());
        if let Ok(path) = std::env::var("FURIOSO_WS_PATH") {
            config.ws_path = path;
        }
        config
    }

    /// Settings for the page the app is running on.
    #[cfg(target_arch = "wasm32")]
    pub fn from_window() -> Self {
        let origin = web_sys::window()
            .and_then(|w| w.location().origin().ok())
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        Self::new(origin)
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// `{ws|wss}://<host>/ws`, the scheme following the page's scheme.
    pub fn endpoint_url(&self) -> Result<Url, RealtimeError> {
        let mut url =
            Url::parse(&self.origin).map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(RealtimeError::InvalidUrl(format!(
                    "unsupported scheme `{}`",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::InvalidUrl(format!("cannot use scheme `{}`", scheme)))?;
        url.set_path(&self.ws_path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}
