//! # washdash configuration
//!
//! Typed configuration for the dashboard's assistant chat core.
//!
//! - TOML loading with per-field defaults (`[gateway]`, `[cache]`, `[chat]`, `[logging]`)
//! - Environment overrides for deployment (`WASHDASH_GATEWAY_URL`, `WASHDASH_LOG`)
//! - Credential resolution for the gateway bearer token
//! - `tracing` subscriber setup
//!
//! ```rust,no_run
//! use washdash_config::{init_logging, AssistantConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AssistantConfig::load(None)?;
//! init_logging(&config.logging);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod components;
mod credentials;
mod loader;
mod logging;

pub use components::*;
pub use credentials::{resolve_api_token, CredentialSource, API_TOKEN_ENV};
pub use loader::{ConfigError, ConfigResult, GATEWAY_URL_ENV, LOG_ENV};
pub use logging::init_logging;
