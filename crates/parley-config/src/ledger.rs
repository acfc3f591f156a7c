use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Credit ledger spend endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Spend RPC URL
    pub spend_url: Url,
    /// Bearer credential for the ledger
    pub service_key: SecretString,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl LedgerConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

const fn default_timeout() -> u64 {
    10
}
