//! Conversation behaviour configuration

use super::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the thread lifecycle controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Number of characters of the first user message used as the thread title
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    /// Abort a streaming reply after this many seconds
    ///
    /// Unset means no timeout; the user can still cancel explicitly.
    pub response_timeout_secs: Option<u64>,
}

fn default_title_max_chars() -> usize {
    defaults::DEFAULT_TITLE_MAX_CHARS
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            response_timeout_secs: None,
        }
    }
}

impl ChatConfig {
    /// Response timeout, if one is configured
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_length_default() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.title_max_chars, 20);
        assert!(config.response_timeout().is_none());
    }

    #[test]
    fn test_response_timeout_deserialize() {
        let config: ChatConfig = toml::from_str("response_timeout_secs = 90").unwrap();
        assert_eq!(config.response_timeout(), Some(Duration::from_secs(90)));
    }
}
