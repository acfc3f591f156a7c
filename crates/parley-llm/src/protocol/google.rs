//! Google Generative Language API streaming wire format

use parley_core::RawToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::alternating_turns;
use crate::types::{CompletionRequest, ProviderConfig, StreamEvent, TokenUsage, ToolSpec};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    pub contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
    pub generation_config: GoogleGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GoogleTool>,
}

#[derive(Debug, Serialize)]
pub struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub parts: Vec<GoogleTextPart>,
}

#[derive(Debug, Serialize)]
pub struct GoogleTextPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    pub function_declarations: Vec<ToolSpec>,
}

impl GoogleRequest {
    pub fn new(request: &CompletionRequest, config: &ProviderConfig) -> Self {
        let (system, turns) = alternating_turns(&request.messages);

        let tools = if request.tools.is_empty() {
            vec![]
        } else {
            vec![GoogleTool {
                function_declarations: request.tools.clone(),
            }]
        };

        Self {
            contents: turns
                .into_iter()
                .map(|turn| GoogleContent {
                    role: Some(if turn.assistant { "model" } else { "user" }),
                    parts: vec![GoogleTextPart { text: turn.text }],
                })
                .collect(),
            system_instruction: system.map(|text| GoogleContent {
                role: None,
                parts: vec![GoogleTextPart { text }],
            }),
            generation_config: GoogleGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            },
            tools,
        }
    }
}

// -- Stream types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleResponseContent>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleResponseContent {
    #[serde(default)]
    pub parts: Vec<GoogleResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub function_call: Option<GoogleFunctionCall>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

/// Convert one streamed response chunk
pub fn google_chunk_to_events(chunk: GoogleResponse) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = chunk
        .candidates
        .into_iter()
        .take(1)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| {
            if let Some(call) = part.function_call {
                Some(StreamEvent::ToolCall(RawToolCall::Direct {
                    id: None,
                    name: call.name,
                    args: call.args,
                }))
            } else {
                part.text.filter(|t| !t.is_empty()).map(StreamEvent::Token)
            }
        })
        .collect();

    if let Some(usage) = chunk.usage_metadata {
        events.push(StreamEvent::Usage(TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
        }));
    }

    events
}
