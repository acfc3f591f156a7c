use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Bearer-token verification service
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Endpoint that exchanges a bearer token for a user id and claims
    pub verify_url: Url,
    /// Service credential presented to the identity provider
    pub service_key: SecretString,
    /// Cache TTL in seconds for verified tokens
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached verifications
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl IdentityConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

const fn default_cache_ttl() -> u64 {
    30
}

const fn default_cache_capacity() -> u64 {
    10_000
}

const fn default_timeout() -> u64 {
    10
}
