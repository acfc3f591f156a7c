//! Mock persona/tool registry
//!
//! Also hosts the local tool route `/routes/echo`, since the gateway
//! resolves local routes against the registry base URL.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const SERVICE_KEY: &str = "sk-registry";

#[derive(Default)]
struct RegistryState {
    personas: HashMap<String, Value>,
    tools: Vec<Value>,
    tool_calls: Mutex<Vec<Value>>,
    fail: bool,
}

pub struct MockRegistry {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<RegistryState>,
}

impl MockRegistry {
    /// Serve the given persona and tool records
    pub async fn start(personas: Vec<Value>, tools: Vec<Value>) -> anyhow::Result<Self> {
        let personas = personas
            .into_iter()
            .map(|p| (p["id"].as_str().unwrap().to_owned(), p))
            .collect();

        Self::start_inner(RegistryState {
            personas,
            tools,
            ..RegistryState::default()
        })
        .await
    }

    /// Answer every registry read with 500
    pub async fn start_failing() -> anyhow::Result<Self> {
        Self::start_inner(RegistryState {
            fail: true,
            ..RegistryState::default()
        })
        .await
    }

    async fn start_inner(state: RegistryState) -> anyhow::Result<Self> {
        let state = Arc::new(state);

        let app = Router::new()
            .route("/personas/{id}", routing::get(handle_persona))
            .route("/tools", routing::get(handle_tools))
            .route("/tool-calls", routing::get(handle_lookup_call).post(handle_record_call))
            .route("/routes/echo", routing::post(handle_echo))
            .with_state(Arc::clone(&state));

        let (addr, shutdown) = super::spawn(app).await?;
        Ok(Self { addr, shutdown, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Entries written to the tool-call log
    pub fn recorded_calls(&self) -> Vec<Value> {
        self.state.tool_calls.lock().unwrap().clone()
    }
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {SERVICE_KEY}"))
}

async fn handle_persona(
    State(state): State<Arc<RegistryState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if state.fail {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.personas.get(&id) {
        Some(persona) => Json(persona.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_tools(
    State(state): State<Arc<RegistryState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if state.fail {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let ids: Vec<&str> = query.get("ids").map(|ids| ids.split(',').collect()).unwrap_or_default();
    let tools: Vec<Value> = state
        .tools
        .iter()
        .filter(|tool| tool["id"].as_str().is_some_and(|id| ids.contains(&id)))
        .cloned()
        .collect();

    Json(tools).into_response()
}

async fn handle_lookup_call(
    State(state): State<Arc<RegistryState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let calls = state.tool_calls.lock().unwrap();
    let found = calls.iter().find(|entry| {
        query.get("user_id").is_some_and(|u| entry["user_id"] == u.as_str())
            && query.get("call_id").is_some_and(|c| entry["call_id"] == c.as_str())
    });

    match found {
        Some(entry) => Json(entry.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_record_call(State(state): State<Arc<RegistryState>>, Json(entry): Json<Value>) -> StatusCode {
    let mut calls = state.tool_calls.lock().unwrap();
    let duplicate = calls
        .iter()
        .any(|existing| existing["user_id"] == entry["user_id"] && existing["call_id"] == entry["call_id"]);

    if duplicate {
        return StatusCode::CONFLICT;
    }

    calls.push(entry);
    StatusCode::CREATED
}

async fn handle_echo(headers: HeaderMap, Json(args): Json<Value>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({"echo": args})).into_response()
}
