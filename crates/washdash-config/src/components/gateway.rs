//! Gateway connection configuration

use super::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the backend chat gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Base URL of the assistant API, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token attached to every request
    ///
    /// Prefer the `WASHDASH_API_TOKEN` environment variable over storing the
    /// token in the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Timeout for non-streaming requests in seconds
    pub timeout_secs: Option<u64>,
    /// Ask the gateway for an incremental (SSE) reply when sending
    #[serde(default = "default_true")]
    pub prefer_streaming: bool,
}

fn default_base_url() -> String {
    defaults::DEFAULT_GATEWAY_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            timeout_secs: None,
            prefer_streaming: true,
        }
    }
}

impl GatewayConfig {
    /// Base URL with any trailing slashes removed
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Request timeout, using the default if not specified
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .unwrap_or(defaults::DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_base_url_strips_trailing_slash() {
        let config = GatewayConfig {
            base_url: "https://dash.example.org/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_base_url(), "https://dash.example.org/api");
    }

    #[test]
    fn test_request_timeout_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_streaming_preferred_by_default() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert!(config.prefer_streaming);
        assert_eq!(config.base_url, defaults::DEFAULT_GATEWAY_URL);
    }
}
