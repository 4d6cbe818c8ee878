//! Read-through cache configuration

use super::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness settings for cached thread and message lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Seconds a fetched list stays fresh before the next read re-fetches
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    defaults::DEFAULT_CACHE_TTL_SECS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// TTL as a `Duration`
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
