//! Anthropic Messages API streaming wire format

use std::collections::HashMap;

use parley_core::RawToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::alternating_turns;
use crate::types::{CompletionRequest, ProviderConfig, StreamEvent, TokenUsage};

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    pub temperature: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl AnthropicRequest {
    pub fn new(request: &CompletionRequest, config: &ProviderConfig) -> Self {
        let (system, turns) = alternating_turns(&request.messages);

        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system,
            messages: turns
                .into_iter()
                .map(|turn| AnthropicMessage {
                    role: if turn.assistant { "assistant" } else { "user" },
                    content: turn.text,
                })
                .collect(),
            temperature: config.temperature,
            stream: config.streaming,
            tools: request
                .tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        }
    }
}

// -- Stream types --

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: AnthropicContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorBody,
    },
}

#[derive(Debug, Deserialize)]
pub struct AnthropicStreamMessage {
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input: String,
}

/// Tracks open content blocks and usage across one message stream
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    tool_uses: HashMap<u32, PendingToolUse>,
    usage: TokenUsage,
}

impl AnthropicStreamState {
    /// Convert one event; `Err` carries an in-stream error message
    pub fn on_event(&mut self, event: AnthropicStreamEvent) -> Result<Vec<StreamEvent>, String> {
        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(input) = message.usage.and_then(|u| u.input_tokens) {
                    self.usage.prompt_tokens = input;
                }
                vec![]
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicContentBlock::Text { text } if !text.is_empty() => vec![StreamEvent::Token(text)],
                AnthropicContentBlock::ToolUse { id, name } => {
                    self.tool_uses.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            input: String::new(),
                        },
                    );
                    vec![]
                }
                AnthropicContentBlock::Text { .. } | AnthropicContentBlock::Other => vec![],
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } if !text.is_empty() => vec![StreamEvent::Token(text)],
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.tool_uses.get_mut(&index) {
                        pending.input.push_str(&partial_json);
                    }
                    vec![]
                }
                AnthropicDelta::TextDelta { .. } | AnthropicDelta::Other => vec![],
            },
            AnthropicStreamEvent::ContentBlockStop { index } => self
                .tool_uses
                .remove(&index)
                .map(|pending| {
                    StreamEvent::ToolCall(RawToolCall::Direct {
                        id: Some(pending.id),
                        name: pending.name,
                        args: Value::String(pending.input),
                    })
                })
                .into_iter()
                .collect(),
            AnthropicStreamEvent::MessageDelta { usage } => match usage.and_then(|u| u.output_tokens) {
                Some(output) => {
                    self.usage.completion_tokens = output;
                    vec![StreamEvent::Usage(self.usage)]
                }
                None => vec![],
            },
            AnthropicStreamEvent::MessageStop => vec![StreamEvent::Done],
            AnthropicStreamEvent::Ping => vec![],
            AnthropicStreamEvent::Error { error } => return Err(error.message),
        };

        Ok(events)
    }
}
