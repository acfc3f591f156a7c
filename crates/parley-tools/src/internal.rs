//! Functions compiled into the gateway, addressed as `internal:<name>`

use serde_json::{Value, json};

use crate::error::ToolError;

pub fn call(name: &str, args: &Value) -> Result<Value, ToolError> {
    match name {
        "current_time" => Ok(current_time()),
        "word_count" => word_count(args),
        other => Err(ToolError::Execution(format!("no internal function `{other}`"))),
    }
}

fn current_time() -> Value {
    let now = jiff::Timestamp::now();
    json!({
        "utc": now.to_string(),
        "unix_ms": now.as_millisecond(),
    })
}

fn word_count(args: &Value) -> Result<Value, ToolError> {
    let text = args
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("`text` must be a string".to_owned()))?;

    Ok(json!({
        "words": text.split_whitespace().count(),
        "characters": text.chars().count(),
    }))
}
