//! `OpenAI` chat completion streaming wire format

use std::collections::BTreeMap;

use parley_core::{MessageRole, RawFunction, RawToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::flatten_tool_result;
use crate::dispatcher::is_reasoning_model;
use crate::types::{CompletionRequest, ProviderConfig, StreamEvent, TokenUsage, ToolSpec};

#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Replaces `max_tokens` for reasoning models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OpenAiTool>,
}

#[derive(Debug, Serialize)]
pub struct OpenAiStreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ToolSpec,
}

impl OpenAiRequest {
    pub fn new(request: &CompletionRequest, config: &ProviderConfig, include_usage: bool) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|message| match message.role {
                MessageRole::System => OpenAiMessage {
                    role: "system",
                    content: message.content.clone(),
                },
                MessageRole::User => OpenAiMessage {
                    role: "user",
                    content: message.content.clone(),
                },
                MessageRole::Assistant => OpenAiMessage {
                    role: "assistant",
                    content: message.content.clone(),
                },
                MessageRole::Tool => OpenAiMessage {
                    role: "user",
                    content: flatten_tool_result(message),
                },
            })
            .collect();

        let reasoning = is_reasoning_model(&config.model);

        Self {
            model: config.model.clone(),
            messages,
            temperature: (!reasoning).then_some(config.temperature),
            max_tokens: (!reasoning).then_some(config.max_tokens),
            max_completion_tokens: reasoning.then_some(config.max_tokens),
            stream: config.streaming,
            stream_options: include_usage.then_some(OpenAiStreamOptions { include_usage: true }),
            tools: request
                .tools
                .iter()
                .map(|tool| OpenAiTool {
                    kind: "function",
                    function: tool.clone(),
                })
                .collect(),
        }
    }
}

// -- Stream types --

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: OpenAiDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Reassembles tool calls that arrive as argument fragments across chunks
#[derive(Debug, Default)]
pub struct OpenAiStreamState {
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl OpenAiStreamState {
    pub fn on_chunk(&mut self, chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::Token(content));
            }

            for delta in choice.delta.tool_calls {
                let partial = self.tool_calls.entry(delta.index).or_default();
                if delta.id.is_some() {
                    partial.id = delta.id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                events.extend(self.drain_tool_calls());
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }));
        }

        events
    }

    /// `[DONE]` sentinel
    pub fn on_done(&mut self) -> Vec<StreamEvent> {
        let mut events = self.drain_tool_calls();
        events.push(StreamEvent::Done);
        events
    }

    fn drain_tool_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .filter(|partial| !partial.name.is_empty())
            .map(|partial| {
                StreamEvent::ToolCall(RawToolCall::Function {
                    id: partial.id,
                    function: RawFunction {
                        name: partial.name,
                        arguments: Value::String(partial.arguments),
                    },
                })
            })
            .collect()
    }
}
