use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Server-held credentials per provider family
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// OpenAI-compatible family (`gpt-*`, `o1*`, `o3*`)
    #[serde(default)]
    pub openai: Option<ProviderEndpointConfig>,
    /// Anthropic family (`claude-*`)
    #[serde(default)]
    pub anthropic: Option<ProviderEndpointConfig>,
    /// Google family (`gemini-*`)
    #[serde(default)]
    pub google: Option<ProviderEndpointConfig>,
}

/// Credential and endpoint for one provider family
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEndpointConfig {
    /// Server-held API key; requests without a custom key fail closed when unset
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// Per-model overrides
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    /// Maximum completion tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Upstream model name replacing the built-in canonical name
    #[serde(default)]
    pub upstream_model: Option<String>,
}
