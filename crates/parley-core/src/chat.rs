use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Role of a chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool result
    Tool,
}

/// Single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role
    pub role: MessageRole,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Tool call this message answers (role `tool` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Optional participant or tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Build a message with the given role and content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// Inbound chat request, immutable once received
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Requested model id (e.g. `gpt-4o`)
    pub model: String,
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,
    /// Persona whose tools and system prompt apply
    #[serde(default, alias = "persona_id")]
    pub persona_id: Option<String>,
    /// User-supplied provider key
    #[serde(default, alias = "custom_api_key")]
    pub custom_api_key: Option<SecretString>,
    /// Client-side flag that a custom key is configured
    #[serde(default, alias = "has_custom_key")]
    pub has_custom_key: Option<bool>,
}

impl ChatRequest {
    /// The supplied custom key, if non-empty and not explicitly disabled
    pub fn custom_key(&self) -> Option<&SecretString> {
        if self.has_custom_key == Some(false) {
            return None;
        }

        self.custom_api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
    }

    /// Concatenated message text used for prompt token estimation
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
