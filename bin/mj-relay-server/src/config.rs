//! Server configuration, loaded from environment variables at startup.

use std::collections::HashMap;
use std::time::Duration;

use mj_relay_core::pricing::{default_group_ratio, PriceTable, DEFAULT_QUOTA_PER_UNIT};
use mj_relay_core::RelaySettings;
use serde::de::DeserializeOwned;

/// Runtime configuration for mj-relay-server.
///
/// Every field has a default so the relay starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://mj-relay.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily rolling log file, in addition to stdout.
    pub log_dir: Option<String>,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Public base URL of this relay, used in task image URLs.
    pub server_address: String,

    /// Shared secret the backend must send on `/mj/notify`.
    pub notify_secret: Option<String>,

    /// Price overrides keyed by action key (`mj_imagine`, ...).
    pub model_price: HashMap<String, f64>,

    pub group_ratio: HashMap<String, f64>,

    pub quota_per_unit: f64,

    /// Fallback backend base URL per channel type.
    pub channel_base_urls: HashMap<i32, String>,

    /// Timeout of one backend submission, in seconds.
    pub submit_timeout_secs: u64,

    /// How long a cached user balance is trusted, in seconds.
    pub quota_cache_ttl_secs: u64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("MJ_RELAY_BIND", "0.0.0.0:3000"),
            database_url: env_or("MJ_RELAY_DATABASE_URL", "sqlite://mj-relay.db"),
            log_level: env_or("MJ_RELAY_LOG", "info"),
            log_json: parse_bool("MJ_RELAY_LOG_JSON", false),
            log_dir: env_opt("MJ_RELAY_LOG_DIR"),
            cors_allowed_origins: env_opt("MJ_RELAY_CORS_ORIGINS"),
            enable_swagger: parse_bool("MJ_RELAY_ENABLE_SWAGGER", true),
            server_address: env_or("MJ_RELAY_SERVER_ADDRESS", "http://localhost:3000"),
            notify_secret: env_opt("MJ_RELAY_NOTIFY_SECRET"),
            model_price: parse_json_env("MJ_RELAY_MODEL_PRICE", HashMap::new()),
            group_ratio: parse_json_env("MJ_RELAY_GROUP_RATIO", default_group_ratio()),
            quota_per_unit: parse_env("MJ_RELAY_QUOTA_PER_UNIT", DEFAULT_QUOTA_PER_UNIT),
            channel_base_urls: parse_json_env("MJ_RELAY_CHANNEL_BASE_URLS", HashMap::new()),
            submit_timeout_secs: parse_env("MJ_RELAY_SUBMIT_TIMEOUT_SECS", 30),
            quota_cache_ttl_secs: parse_env("MJ_RELAY_QUOTA_CACHE_TTL_SECS", 60),
        }
    }

    /// The immutable settings handed to the submission engine.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            pricing: PriceTable::new(
                self.model_price.clone(),
                self.group_ratio.clone(),
                self.quota_per_unit,
            ),
            channel_base_urls: self.channel_base_urls.clone(),
            server_address: self.server_address.clone(),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            quota_cache_ttl: Duration::from_secs(self.quota_cache_ttl_secs),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// Runs before tracing is initialised, so problems go to stderr.
fn parse_json_env<T: DeserializeOwned>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_json_table(key, &raw).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_json_table<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("WARN: {key} is not a valid JSON table ({e}); using the default");
            None
        }
    }
}
