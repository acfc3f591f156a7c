//! Provider wire formats and conversions to provider-neutral types

pub mod anthropic;
pub mod google;
pub mod openai;

use parley_core::{ChatMessage, MessageRole};

/// Render a tool-result message as plain text
///
/// Chat history replays tool results without the assistant turn that
/// requested them, so they are flattened into ordinary user content.
fn flatten_tool_result(message: &ChatMessage) -> String {
    let name = message.name.as_deref().unwrap_or("tool");
    format!("[{name} result] {}", message.content)
}

/// A conversation turn for providers with strict user/assistant alternation
struct Turn {
    assistant: bool,
    text: String,
}

/// Split system instructions from the conversation and merge adjacent turns
/// by the same author
fn alternating_turns(messages: &[ChatMessage]) -> (Option<String>, Vec<Turn>) {
    let mut system: Vec<&str> = Vec::new();
    let mut turns: Vec<Turn> = Vec::new();

    for message in messages {
        let (assistant, text) = match message.role {
            MessageRole::System => {
                system.push(&message.content);
                continue;
            }
            MessageRole::Assistant => (true, message.content.clone()),
            MessageRole::User => (false, message.content.clone()),
            MessageRole::Tool => (false, flatten_tool_result(message)),
        };

        if text.is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.assistant == assistant => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
            }
            _ => turns.push(Turn { assistant, text }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_turns_and_extracts_system() {
        let mut tool = ChatMessage::new(MessageRole::Tool, "12:00");
        tool.name = Some("current_time".to_owned());

        let messages = vec![
            ChatMessage::new(MessageRole::System, "be brief"),
            ChatMessage::new(MessageRole::User, "what time is it"),
            ChatMessage::new(MessageRole::Assistant, "checking"),
            tool,
            ChatMessage::new(MessageRole::User, "thanks"),
        ];

        let (system, turns) = alternating_turns(&messages);

        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(turns.len(), 3);
        assert!(!turns[0].assistant);
        assert!(turns[1].assistant);
        assert_eq!(turns[2].text, "[current_time result] 12:00\n\nthanks");
    }
}
