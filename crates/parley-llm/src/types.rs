use std::fmt;

use parley_core::{ChatMessage, RawToolCall};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// Wire protocol family of an upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved upstream configuration for one request
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub family: ProviderFamily,
    pub base_url: Url,
    pub api_key: SecretString,
    /// Upstream model name
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub streaming: bool,
}

/// Tool offered to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// Provider-neutral completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Event yielded by a provider stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Content chunk
    Token(String),
    /// Completed tool call, in provider shape
    ToolCall(RawToolCall),
    /// Provider-reported usage
    Usage(TokenUsage),
    /// Upstream finished
    Done,
}
