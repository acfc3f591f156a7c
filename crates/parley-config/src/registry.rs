use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Persona and tool registry
///
/// Absent means requests run without persona tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Base URL; `/personas/{id}`, `/tools` and `/tool-calls` hang off it
    pub base_url: Url,
    /// Bearer credential for the registry
    pub service_key: SecretString,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

const fn default_timeout() -> u64 {
    10
}
