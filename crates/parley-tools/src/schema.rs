//! Minimal JSON Schema checks for tool arguments
//!
//! Covers what tool contracts in the registry actually use: the arguments
//! must be an object, `required` fields must be present, and each declared
//! property must match its `type`.

use serde_json::Value;

/// Check `args` against `schema`, returning a readable reason on mismatch
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(object) = args.as_object() else {
        return Err("arguments must be a JSON object".to_owned());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(format!("missing required field `{field}`"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in object {
        let Some(declared) = properties.get(name).and_then(|p| p.get("type")) else {
            continue;
        };

        let matches = match declared {
            Value::String(kind) => type_matches(kind, value),
            Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).any(|kind| type_matches(kind, value)),
            _ => true,
        };

        if !matches {
            return Err(format!("field `{name}` must be of type {}", describe(declared)));
        }
    }

    Ok(())
}

fn type_matches(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_whole_number(value),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// `3` and `3.0` both count as integers
fn is_whole_number(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.is_finite() && n.fract().abs() < f64::EPSILON)
}

fn describe(declared: &Value) -> String {
    match declared {
        Value::String(kind) => kind.clone(),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}
