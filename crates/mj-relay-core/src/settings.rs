//! Immutable relay configuration passed to the engine at construction.

use std::collections::HashMap;
use std::time::Duration;

use crate::entities::DEFAULT_QUOTA_CACHE_TTL;
use crate::pricing::PriceTable;

/// Bound on a single backend submission call.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub pricing: PriceTable,
    /// Backend base URL per channel type, used when a channel has no own URL.
    pub channel_base_urls: HashMap<i32, String>,
    /// Public address of this relay; prefixes proxied image URLs.
    pub server_address: String,
    pub submit_timeout: Duration,
    /// Lifetime of a cached user balance in the quota pre-check.
    pub quota_cache_ttl: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            pricing: PriceTable::default(),
            channel_base_urls: HashMap::new(),
            server_address: "http://localhost:3000".to_owned(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            quota_cache_ttl: DEFAULT_QUOTA_CACHE_TTL,
        }
    }
}
