//! Model id to upstream provider resolution

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parley_config::{ModelOverride, ProviderEndpointConfig, ProvidersConfig};
use reqwest::Client;
use secrecy::SecretString;
use url::Url;

use crate::error::DispatchError;
use crate::provider::ChatProvider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::openai::OpenAiProvider;
use crate::types::{ProviderConfig, ProviderFamily};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Reasoning models only accept the default temperature
const REASONING_TEMPERATURE: f32 = 1.0;

/// Short model ids mapped to pinned upstream releases
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("claude-3-5-sonnet", "claude-3-5-sonnet-20241022"),
    ("claude-3-opus", "claude-3-opus-20240229"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
];

/// Provider family for a model id, by prefix
pub fn family_for(model_id: &str) -> Option<ProviderFamily> {
    if model_id.starts_with("gpt-") || is_reasoning_model(model_id) {
        Some(ProviderFamily::OpenAi)
    } else if model_id.starts_with("claude-") {
        Some(ProviderFamily::Anthropic)
    } else if model_id.starts_with("gemini-") {
        Some(ProviderFamily::Google)
    } else {
        None
    }
}

pub(crate) fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3")
}

/// Upstream model name for a requested model id
pub fn canonical_model(model_id: &str) -> &str {
    CANONICAL_NAMES
        .iter()
        .find(|(short, _)| *short == model_id)
        .map_or(model_id, |(_, full)| full)
}

static OPENAI_BASE_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://api.openai.com/v1").expect("valid default URL"));
static ANTHROPIC_BASE_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://api.anthropic.com/v1").expect("valid default URL"));
static GOOGLE_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://generativelanguage.googleapis.com/v1beta").expect("valid default URL")
});

fn default_base_url(family: ProviderFamily) -> Url {
    match family {
        ProviderFamily::OpenAi => OPENAI_BASE_URL.clone(),
        ProviderFamily::Anthropic => ANTHROPIC_BASE_URL.clone(),
        ProviderFamily::Google => GOOGLE_BASE_URL.clone(),
    }
}

#[derive(Debug, Default, Clone)]
struct Endpoint {
    api_key: Option<SecretString>,
    base_url: Option<Url>,
}

impl From<&Option<ProviderEndpointConfig>> for Endpoint {
    fn from(config: &Option<ProviderEndpointConfig>) -> Self {
        config.as_ref().map_or_else(Self::default, |c| Self {
            api_key: c.api_key.clone(),
            base_url: c.base_url.clone(),
        })
    }
}

/// Resolves model ids to provider configurations and builds streaming clients
#[derive(Clone)]
pub struct ProviderDispatcher {
    client: Client,
    openai: Endpoint,
    anthropic: Endpoint,
    google: Endpoint,
    overrides: IndexMap<String, ModelOverride>,
}

impl ProviderDispatcher {
    pub fn new(providers: &ProvidersConfig, overrides: &IndexMap<String, ModelOverride>) -> Self {
        Self {
            client: Client::new(),
            openai: (&providers.openai).into(),
            anthropic: (&providers.anthropic).into(),
            google: (&providers.google).into(),
            overrides: overrides.clone(),
        }
    }

    const fn endpoint(&self, family: ProviderFamily) -> &Endpoint {
        match family {
            ProviderFamily::OpenAi => &self.openai,
            ProviderFamily::Anthropic => &self.anthropic,
            ProviderFamily::Google => &self.google,
        }
    }

    /// Resolve the upstream configuration for `model_id`
    ///
    /// An entitled custom key wins over the server-held key. Fails closed
    /// when neither is available.
    pub fn resolve(
        &self,
        model_id: &str,
        has_custom_key: bool,
        custom_api_key: Option<&SecretString>,
    ) -> Result<ProviderConfig, DispatchError> {
        let family = family_for(model_id).ok_or_else(|| DispatchError::UnsupportedModel {
            model: model_id.to_owned(),
        })?;
        let endpoint = self.endpoint(family);

        let api_key = custom_api_key
            .filter(|_| has_custom_key)
            .or(endpoint.api_key.as_ref())
            .cloned()
            .ok_or_else(|| DispatchError::MissingCredential {
                family: family.as_str(),
                model: model_id.to_owned(),
            })?;

        let overrides = self.overrides.get(model_id);
        let model = overrides
            .and_then(|o| o.upstream_model.clone())
            .unwrap_or_else(|| canonical_model(model_id).to_owned());

        let default_temperature = if is_reasoning_model(model_id) {
            REASONING_TEMPERATURE
        } else {
            DEFAULT_TEMPERATURE
        };

        Ok(ProviderConfig {
            family,
            base_url: endpoint.base_url.clone().unwrap_or_else(|| default_base_url(family)),
            api_key,
            model,
            max_tokens: overrides.and_then(|o| o.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: overrides.and_then(|o| o.temperature).unwrap_or(default_temperature),
            streaming: true,
        })
    }

    /// Build the streaming client for a resolved configuration
    pub fn provider(&self, config: ProviderConfig) -> Arc<dyn ChatProvider> {
        match config.family {
            ProviderFamily::OpenAi => Arc::new(OpenAiProvider::new(self.client.clone(), config)),
            ProviderFamily::Anthropic => Arc::new(AnthropicProvider::new(self.client.clone(), config)),
            ProviderFamily::Google => Arc::new(GoogleProvider::new(self.client.clone(), config)),
        }
    }
}
