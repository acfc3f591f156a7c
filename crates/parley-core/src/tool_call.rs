use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool call exactly as a provider emitted it
///
/// OpenAI-style providers wrap a JSON-encoded argument string in a
/// `function` object; others send the arguments as an object next to the
/// name. Business logic only ever sees the [`ToolInvocation`] produced by
/// [`RawToolCall::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawToolCall {
    /// `{id, function: {name, arguments: "<json>"}}`
    Function {
        #[serde(default)]
        id: Option<String>,
        function: RawFunction,
    },
    /// `{id?, name, args: {...}}`
    Direct {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default, alias = "input", alias = "arguments")]
        args: Value,
    },
}

/// Function payload of an OpenAI-style tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFunction {
    pub name: String,
    /// Usually a JSON string; some compatible APIs send an object
    #[serde(default)]
    pub arguments: Value,
}

/// Canonical tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    /// Arguments; anything other than an object fails schema validation
    pub args: Value,
}

impl RawToolCall {
    /// Normalize into the canonical form
    ///
    /// `fallback_id` supplies a call id for providers that omit one.
    /// Argument strings that are not valid JSON are kept as a string value
    /// so validation can report them per call.
    pub fn normalize(self, fallback_id: impl FnOnce() -> String) -> ToolInvocation {
        let (id, name, args) = match self {
            Self::Function { id, function } => (id, function.name, decode_arguments(function.arguments)),
            Self::Direct { id, name, args } => (id, name, decode_arguments(args)),
        };

        ToolInvocation {
            call_id: id.filter(|id| !id.is_empty()).unwrap_or_else(fallback_id),
            name,
            args,
        }
    }
}

fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::Null => Value::Object(Map::new()),
        Value::String(text) if text.trim().is_empty() => Value::Object(Map::new()),
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
