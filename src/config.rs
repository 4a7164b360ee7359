// Client configuration
// Base URL and timeout for the backend, freshness policy per cached resource

use serde::Deserialize;
use std::time::Duration;

use crate::cache::{CachePolicy, DEFAULT_LIST_TTL_SECONDS};
use crate::error::ClientError;

pub const ENV_PREFIX: &str = "SCHEDULINK";
pub const ENV_API_URL: &str = "SCHEDULINK_API_URL";
pub const ENV_TIMEOUT_MS: &str = "SCHEDULINK_TIMEOUT_MS";
pub const ENV_USERS_CACHE_TTL_MS: &str = "SCHEDULINK_USERS_CACHE_TTL_MS";
pub const ENV_SLOTS_CACHE_TTL_MS: &str = "SCHEDULINK_SLOTS_CACHE_TTL_MS";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub users_cache: CachePolicy,
    pub slots_cache: CachePolicy,
}

// Raw SCHEDULINK_* variables, keyed by the name after the prefix
#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    api_url: Option<String>,
    timeout_ms: Option<u64>,
    // Kept as text so "none" can be told apart from a number
    users_cache_ttl_ms: Option<String>,
    slots_cache_ttl_ms: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            users_cache: CachePolicy::UntilInvalidated,
            slots_cache: CachePolicy::Ttl(Duration::from_secs(DEFAULT_LIST_TTL_SECONDS)),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_users_cache(mut self, policy: CachePolicy) -> Self {
        self.users_cache = policy;
        self
    }

    pub fn with_slots_cache(mut self, policy: CachePolicy) -> Self {
        self.slots_cache = policy;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    // Reads SCHEDULINK_* from the process environment; unset variables keep their defaults
    pub fn from_env() -> Result<Self, ClientError> {
        Self::load(None)
    }

    // Same as from_env over an explicit variable map instead of the process environment
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, ClientError> {
        Self::load(Some(vars))
    }

    fn load(source: Option<config::Map<String, String>>) -> Result<Self, ClientError> {
        let settings: EnvSettings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).source(source))
            .build()
            .and_then(|loaded| loaded.try_deserialize())
            .map_err(|e| ClientError::ConfigError(e.to_string()))?;

        let mut config = Self::default();
        if let Some(url) = settings.api_url {
            config.base_url = url;
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(raw) = settings.users_cache_ttl_ms {
            config.users_cache = parse_policy(ENV_USERS_CACHE_TTL_MS, &raw)?;
        }
        if let Some(raw) = settings.slots_cache_ttl_ms {
            config.slots_cache = parse_policy(ENV_SLOTS_CACHE_TTL_MS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ClientError::ConfigError("base URL is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::ConfigError(format!(
                "base URL must start with http:// or https://, got {}",
                url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// "none" or 0 means entries live until invalidated
fn parse_policy(name: &str, raw: &str) -> Result<CachePolicy, ClientError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(CachePolicy::UntilInvalidated);
    }
    raw.parse::<u64>()
        .map(|ms| CachePolicy::from_ttl_ms(Some(ms)))
        .map_err(|_| ClientError::ConfigError(format!("{} must be milliseconds or none, got {:?}", name, raw)))
}
