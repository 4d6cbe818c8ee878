//! Gateway credential resolution
//!
//! The chat core only needs an opaque bearer token. [`resolve_api_token`]
//! checks sources in this order:
//! 1. Environment variable `WASHDASH_API_TOKEN`
//! 2. Config file value (`gateway.api_token`)

use crate::components::GatewayConfig;
use tracing::debug;

/// Environment variable holding the gateway bearer token
pub const API_TOKEN_ENV: &str = "WASHDASH_API_TOKEN";

/// Source of a resolved credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// From an environment variable
    EnvVar,
    /// From the config file
    Config,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::EnvVar => write!(f, "env"),
            CredentialSource::Config => write!(f, "config"),
        }
    }
}

/// Resolve the gateway token
///
/// Returns `(token, source)`, or `None` when the gateway is used anonymously.
pub fn resolve_api_token(config: &GatewayConfig) -> Option<(String, CredentialSource)> {
    if let Ok(value) = std::env::var(API_TOKEN_ENV) {
        if !value.is_empty() {
            debug!("Resolved gateway token from env var {}", API_TOKEN_ENV);
            return Some((value, CredentialSource::EnvVar));
        }
    }

    if let Some(token) = config.api_token.as_deref() {
        if !token.is_empty() {
            debug!("Resolved gateway token from config");
            return Some((token.to_string(), CredentialSource::Config));
        }
    }

    None
}
