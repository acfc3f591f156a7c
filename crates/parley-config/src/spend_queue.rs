use std::path::PathBuf;

use serde::Deserialize;

/// Client-side offline spend queue
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpendQueueConfig {
    /// JSON file holding queued spends across restarts
    pub path: PathBuf,
    /// Ledger account the queued spends are charged to
    pub user_id: String,
    /// Failed replays after which a spend is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_max_retries() -> u32 {
    3
}
