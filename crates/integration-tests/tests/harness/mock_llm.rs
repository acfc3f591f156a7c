//! Mock OpenAI-compatible streaming backend
//!
//! Replies to every chat completion with a scripted SSE body and records
//! what the gateway sent upstream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Tool call the mock emits after its tokens
#[derive(Debug, Clone)]
pub struct ScriptedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
struct Script {
    tokens: Vec<String>,
    tool_calls: Vec<ScriptedToolCall>,
    fail: bool,
}

/// One request as received by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

struct MockLlmState {
    script: Script,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

impl MockLlm {
    /// Stream the given tokens, then finish
    pub async fn start(tokens: &[&str]) -> anyhow::Result<Self> {
        Self::start_inner(Script {
            tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
            ..Script::default()
        })
        .await
    }

    /// Stream the tokens, then request the given tool calls
    pub async fn start_with_tool_calls(tokens: &[&str], tool_calls: Vec<ScriptedToolCall>) -> anyhow::Result<Self> {
        Self::start_inner(Script {
            tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
            tool_calls,
            fail: false,
        })
        .await
    }

    /// Reject every request with 500
    pub async fn start_failing() -> anyhow::Result<Self> {
        Self::start_inner(Script {
            fail: true,
            ..Script::default()
        })
        .await
    }

    async fn start_inner(script: Script) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            script,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let (addr, shutdown) = super::spawn(app).await?;
        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for the provider config; the client appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    });

    let script = &state.script;

    if script.fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "mock server intentional failure", "type": "server_error"}})),
        )
            .into_response();
    }

    let mut chunks: Vec<Value> = script
        .tokens
        .iter()
        .map(|token| json!({"choices": [{"index": 0, "delta": {"content": token}, "finish_reason": null}]}))
        .collect();

    if script.tool_calls.is_empty() {
        chunks.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}));
    } else {
        let deltas: Vec<Value> = script
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                json!({
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments.to_string()}
                })
            })
            .collect();
        chunks.push(json!({"choices": [{"index": 0, "delta": {"tool_calls": deltas}, "finish_reason": null}]}));
        chunks.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}));
    }

    let mut frames: Vec<Result<Bytes, Infallible>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::from(format!("data: {chunk}\n\n"))))
        .collect();
    frames.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(futures_util::stream::iter(frames)))
        .unwrap()
}
