//! Console configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`ConsoleConfig::api_base_url`].
pub const ENV_API_BASE_URL: &str = "MODBOARD_API_BASE_URL";

/// Environment variable overriding [`ConsoleConfig::push_url`].
pub const ENV_PUSH_URL: &str = "MODBOARD_WS_URL";

/// Endpoints, timeouts and retry policy for one console session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL every REST path is appended to.
    pub api_base_url: String,
    /// WebSocket URL of the push channel.
    pub push_url: String,
    /// Per-request timeout (ms).
    pub request_timeout_ms: u64,
    /// Delay between push reconnect attempts (ms).
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts after a drop before giving up.
    pub reconnect_attempts: u32,
    /// Credentials accepted offline when the backend is unreachable.
    pub demo_username: String,
    pub demo_password: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            push_url: "ws://localhost:3000/ws".to_string(),
            request_timeout_ms: 10_000,
            reconnect_delay_ms: 1_000,
            reconnect_attempts: 5,
            demo_username: "admin".to_string(),
            demo_password: "admin123".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values from a variable lookup. Empty values are ignored.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = non_empty(ENV_PUSH_URL) {
            self.push_url = url;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
