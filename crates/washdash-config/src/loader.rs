//! Config file discovery, parsing, environment overrides and validation

use crate::components::AssistantConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding `gateway.base_url`
pub const GATEWAY_URL_ENV: &str = "WASHDASH_GATEWAY_URL";

/// Environment variable overriding `logging.level`
pub const LOG_ENV: &str = "WASHDASH_LOG";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field path, e.g. `cache.ttl_secs`
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl AssistantConfig {
    /// Default config location: `$XDG_CONFIG_HOME/washdash/assistant.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join("washdash")
            .join("assistant.toml")
    }

    /// Load configuration
    ///
    /// Reads `path` (or the default location), falls back to defaults when the
    /// file does not exist, applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let mut config = if path.exists() {
            info!("Loading assistant config from {}", path.display());
            Self::load_from_file(&path)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying overrides
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse config from a TOML string
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `WASHDASH_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(GATEWAY_URL_ENV) {
            debug!("Gateway URL overridden by {}", GATEWAY_URL_ENV);
            self.gateway.base_url = url;
        }
        if let Some(level) = non_empty_env(LOG_ENV) {
            self.logging.level = level;
        }
    }

    /// Check values that parse but cannot work
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.gateway.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "gateway.base_url",
                reason: format!("expected an http(s) URL, got '{}'", url),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.ttl_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chat.title_max_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "chat.title_max_chars",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chat.response_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "chat.response_timeout_secs",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
