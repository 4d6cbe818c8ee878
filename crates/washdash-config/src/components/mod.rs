//! Configuration sections

mod cache;
mod chat;
mod gateway;
mod logging;

pub use cache::CacheConfig;
pub use chat::ChatConfig;
pub use gateway::GatewayConfig;
pub use logging::LoggingConfig;

use serde::{Deserialize, Serialize};

/// Default values shared across sections
pub mod defaults {
    /// Gateway base URL used when nothing is configured
    pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000/api/v1/assistant";
    /// Per-request timeout for gateway calls
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Freshness window for cached thread and message lists
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
    /// Characters of the first user message used as a thread title
    pub const DEFAULT_TITLE_MAX_CHARS: usize = 20;
    /// Log level when neither config nor `RUST_LOG` set one
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

/// Root configuration for the assistant chat core
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistantConfig {
    /// Backend gateway connection
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Thread/message read-through cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Conversation behaviour
    #[serde(default)]
    pub chat: ChatConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}
