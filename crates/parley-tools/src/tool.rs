use std::fmt;

use parley_auth::PremiumGated;
use parley_llm::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Where a tool runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolEndpoint {
    /// Path on the registry host, e.g. `/functions/weather`
    LocalRoute(String),
    /// Absolute external URL
    Remote(Url),
    /// Function compiled into the gateway, written `internal:<name>`
    Internal(String),
}

impl TryFrom<String> for ToolEndpoint {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if let Some(name) = raw.strip_prefix("internal:") {
            return Ok(Self::Internal(name.to_owned()));
        }

        if raw.starts_with('/') {
            return Ok(Self::LocalRoute(raw));
        }

        Url::parse(&raw)
            .map(Self::Remote)
            .map_err(|e| format!("invalid tool endpoint `{raw}`: {e}"))
    }
}

impl From<ToolEndpoint> for String {
    fn from(endpoint: ToolEndpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for ToolEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalRoute(path) => f.write_str(path),
            Self::Remote(url) => f.write_str(url.as_str()),
            Self::Internal(name) => write!(f, "internal:{name}"),
        }
    }
}

/// Tool definition owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    /// Unique name the model calls the tool by
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Parameter contract
    #[serde(default = "empty_object_schema")]
    pub json_schema: Value,
    pub endpoint: ToolEndpoint,
    /// Credits debited per execution
    #[serde(default)]
    pub cost_tokens: u64,
    #[serde(default)]
    pub requires_premium: bool,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl Tool {
    /// Definition offered to the model
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema.clone(),
        }
    }
}

impl PremiumGated for Tool {
    fn requires_premium(&self) -> bool {
        self.requires_premium
    }
}

/// Named bundle of a system prompt and allowed tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default, alias = "toolIds")]
    pub tool_ids: Vec<String>,
}
