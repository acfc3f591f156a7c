//! Server-sent event payloads of the chat stream

use axum::response::sse::Event;
use parley_tools::ToolResult;
use serde::Serialize;
use serde_json::Value;

/// Usage totals carried by the terminal frame
///
/// `prompt_tokens` and `completion_tokens` are the counts `total_cost` was
/// priced from. Counts the provider reported, if any, ride alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageFrame {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_completion_tokens: Option<u64>,
}

/// One `data:` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Token {
        token: String,
    },
    ToolResult {
        role: &'static str,
        tool_call_id: String,
        name: String,
        content: String,
    },
    /// Fatal; nothing follows it
    Error {
        error: String,
    },
    Done {
        done: bool,
        usage: UsageFrame,
    },
}

impl Frame {
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token { token: token.into() }
    }

    pub fn tool(result: &ToolResult) -> Self {
        Self::ToolResult {
            role: "tool",
            tool_call_id: result.call_id.clone(),
            name: result.name.clone(),
            content: result.content(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }

    pub const fn done(usage: UsageFrame) -> Self {
        Self::Done { done: true, usage }
    }

    pub fn to_event(&self) -> Result<Event, axum::Error> {
        Event::default().json_data(self)
    }
}

/// Whether a provider token is worth sending to the client
///
/// Blank chunks are dropped, but a chunk carrying a line break is kept so
/// markdown paragraphs and lists survive.
pub fn is_forwardable(token: &str) -> bool {
    token.contains('\n') || !token.trim().is_empty()
}

/// Human-readable recap of a tool batch, appended after the model's answer
pub fn summarize_tools(results: &[ToolResult]) -> String {
    let mut summary = String::from("\n\n**Tool results**\n");

    for result in results {
        let line = match &result.output {
            Ok(Value::String(text)) => format!("- {}: {text}\n", result.name),
            Ok(value) => format!("- {}: {value}\n", result.name),
            Err(message) => format!("- {} failed: {message}\n", result.name),
        };
        summary.push_str(&line);
    }

    summary
}

/// Split text into pieces of at most `max_chars` characters
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_chars).map(|chunk| chunk.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn result(name: &str, output: Result<Value, String>) -> ToolResult {
        ToolResult {
            call_id: format!("call_{name}"),
            name: name.to_owned(),
            output,
            tokens_spent: 0,
            replayed: false,
        }
    }

    #[test]
    fn frames_serialize_to_wire_shapes() {
        assert_eq!(serde_json::to_value(Frame::token("hi")).unwrap(), json!({"token": "hi"}));
        assert_eq!(
            serde_json::to_value(Frame::error("insufficient_credits")).unwrap(),
            json!({"error": "insufficient_credits"})
        );
        assert_eq!(
            serde_json::to_value(Frame::done(UsageFrame {
                prompt_tokens: 3,
                completion_tokens: 5,
                total_cost: 1,
                reported_prompt_tokens: None,
                reported_completion_tokens: None,
            }))
            .unwrap(),
            json!({"done": true, "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_cost": 1}})
        );
        assert_eq!(
            serde_json::to_value(Frame::done(UsageFrame {
                prompt_tokens: 3,
                completion_tokens: 5,
                total_cost: 1,
                reported_prompt_tokens: Some(4),
                reported_completion_tokens: Some(6),
            }))
            .unwrap(),
            json!({"done": true, "usage": {
                "prompt_tokens": 3,
                "completion_tokens": 5,
                "total_cost": 1,
                "reported_prompt_tokens": 4,
                "reported_completion_tokens": 6
            }})
        );
    }

    #[test]
    fn tool_frame_carries_call_id_and_content() {
        let frame = Frame::tool(&result("lookup", Ok(json!({"answer": 42}))));

        assert_eq!(
            serde_json::to_value(frame).unwrap(),
            json!({
                "role": "tool",
                "tool_call_id": "call_lookup",
                "name": "lookup",
                "content": "{\"answer\":42}"
            })
        );
    }

    #[test]
    fn blank_tokens_are_dropped_but_newlines_kept() {
        assert!(is_forwardable("hello"));
        assert!(is_forwardable(" world"));
        assert!(is_forwardable("\n"));
        assert!(is_forwardable("  \n\n"));
        assert!(!is_forwardable(""));
        assert!(!is_forwardable("   "));
        assert!(!is_forwardable("\t"));
    }

    #[test]
    fn summary_lists_successes_and_failures() {
        let summary = summarize_tools(&[
            result("clock", Ok(json!("12:00"))),
            result("search", Err("unknown tool: search".to_owned())),
        ]);

        assert!(summary.contains("- clock: 12:00"));
        assert!(summary.contains("- search failed: unknown tool: search"));
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        let chunks = chunk_text("héllo wörld", 4);

        assert_eq!(chunks, ["héll", "o wö", "rld"]);
        assert!(chunk_text("", 4).is_empty());
    }
}
