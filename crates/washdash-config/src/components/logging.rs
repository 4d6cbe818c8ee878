//! Log output configuration

use super::defaults;
use serde::{Deserialize, Serialize};

/// Settings for the `tracing` subscriber
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default level for washdash crates (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_level")]
    pub level: String,
    /// Full `EnvFilter` directive; takes precedence over `level`
    pub filter: Option<String>,
    /// Colourise output
    #[serde(default)]
    pub ansi: bool,
}

fn default_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            filter: None,
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive derived from this config
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) if !filter.trim().is_empty() => filter.clone(),
            _ => format!(
                "washdash_core={level},washdash_gateway={level},washdash_config={level},washdash_chat={level}",
                level = self.level
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_from_level() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.directive(),
            "washdash_core=debug,washdash_gateway=debug,washdash_config=debug,washdash_chat=debug"
        );
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = LoggingConfig {
            filter: Some("washdash_core=trace".to_string()),
            ..Default::default()
        };
        assert_eq!(config.directive(), "washdash_core=trace");
    }
}
