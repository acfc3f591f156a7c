//! Helpers for reading the gateway's SSE frames

use serde_json::Value;

/// Parse every `data:` line of an SSE body as JSON
pub fn frames(text: &str) -> Vec<Value> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

/// Read a whole streamed response and parse its frames
pub async fn read_frames(response: reqwest::Response) -> Vec<Value> {
    frames(&response.text().await.unwrap())
}

/// Concatenated `token` frames
pub fn text(frames: &[Value]) -> String {
    frames.iter().filter_map(|f| f["token"].as_str()).collect()
}

/// Frames with `role: "tool"`
pub fn tool_results(frames: &[Value]) -> Vec<&Value> {
    frames.iter().filter(|f| f["role"] == "tool").collect()
}

/// The terminal `done` frame, if the stream completed
pub fn done(frames: &[Value]) -> Option<&Value> {
    frames.last().filter(|f| f["done"] == true)
}
