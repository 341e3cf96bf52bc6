use std::fmt;

use anyhow::{bail, Result};

/// Process configuration consumed by the session lifecycle. Constructed once
/// at entry and passed by reference; there is no ambient global state.
#[derive(Clone)]
pub struct RuntimeConfig {
    base_url: String,
    token: String,
    pub approve_when_unsupported: bool,
    pub command_timeout_ms: u64,
}

impl RuntimeConfig {
    pub fn new(
        url: &str,
        token: &str,
        approve_when_unsupported: bool,
        command_timeout_ms: u64,
    ) -> Result<Self> {
        let base_url = url.trim().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("url must start with http:// or https://, got '{base_url}'");
        }
        let token = token.trim().to_string();
        if token.is_empty() {
            bail!("an access token is required; set --token or HEARTH_TOKEN");
        }
        if command_timeout_ms == 0 {
            bail!("command timeout must be greater than zero");
        }
        Ok(Self {
            base_url,
            token,
            approve_when_unsupported,
            command_timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// WebSocket endpoint derived from the http(s) base URL.
    pub fn websocket_url(&self) -> String {
        let stripped = self
            .base_url
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| {
                self.base_url
                    .strip_prefix("http://")
                    .map(|rest| format!("ws://{rest}"))
            })
            .unwrap_or_else(|| self.base_url.clone());
        format!("{stripped}/api/websocket")
    }
}

// The credential must never reach logs.
impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("approve_when_unsupported", &self.approve_when_unsupported)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfig;

    #[test]
    fn websocket_url_maps_scheme_and_appends_api_path() {
        let config =
            RuntimeConfig::new("http://homeassistant.local:8123/", "token", false, 30_000)
                .expect("config");
        assert_eq!(config.base_url(), "http://homeassistant.local:8123");
        assert_eq!(
            config.websocket_url(),
            "ws://homeassistant.local:8123/api/websocket"
        );

        let secure = RuntimeConfig::new("https://ha.example.org", "token", false, 30_000)
            .expect("config");
        assert_eq!(secure.websocket_url(), "wss://ha.example.org/api/websocket");
    }

    #[test]
    fn empty_token_and_bad_scheme_are_rejected() {
        assert!(RuntimeConfig::new("http://ha.local", "  ", false, 30_000).is_err());
        assert!(RuntimeConfig::new("ftp://ha.local", "token", false, 30_000).is_err());
        assert!(RuntimeConfig::new("http://ha.local", "token", false, 0).is_err());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let config = RuntimeConfig::new("http://ha.local", "very-secret", true, 30_000)
            .expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
