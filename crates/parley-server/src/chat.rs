//! `POST /v1/chat`
//!
//! Every check that can reject the request runs before the stream opens,
//! so clients get a plain JSON error instead of a half-written SSE body.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use http::{HeaderMap, StatusCode};
use parley_auth::{Authorization, EntitlementGate, bearer_token};
use parley_billing::{MeterSession, StreamMeter, cost};
use parley_core::{ChatMessage, ChatRequest, MessageRole, Principal};
use parley_llm::CompletionRequest;
use parley_tools::{Tool, ToolRouter};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument as _;

use crate::error::GatewayError;
use crate::frame::Frame;
use crate::session::ChatSession;
use crate::state::GatewayState;

/// Frames buffered between the producer task and the response body
const FRAME_BUFFER: usize = 64;

pub async fn chat_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let token = bearer_token(&headers)?;
    let claims = state.identity().verify(token).await?;

    let request = parse_request(&body?)?;
    let principal = claims.principal(request.custom_key().is_some());

    let billed = match state.gate().authorize(&principal, &request.model) {
        Authorization::Allow { billed } => billed,
        Authorization::Deny(reason) => {
            tracing::info!(
                user_id = %principal.user_id,
                model = %request.model,
                reason = reason.as_str(),
                "model access denied"
            );
            return Err(GatewayError::PremiumRequired);
        }
    };

    let persona = discover_persona(&state, request.persona_id.as_deref(), &principal).await;

    let provider_config = state
        .dispatcher()
        .resolve(&request.model, principal.custom_key, request.custom_key())?;
    let provider = state.dispatcher().provider(provider_config);

    let router = ToolRouter::new(
        principal.clone(),
        persona.tools,
        state.ledger(),
        state.tool_log(),
        state.executor(),
    );

    let mut messages = request.messages;
    if let Some(system_prompt) = persona.system_prompt {
        messages.insert(0, ChatMessage::new(MessageRole::System, system_prompt));
    }

    let prompt_text = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
    let session = MeterSession {
        session_id: uuid::Uuid::new_v4().to_string(),
        user_id: principal.user_id.clone(),
        prompt_tokens: cost::estimate_tokens(&prompt_text, &request.model),
        model: request.model,
        billed,
    };

    let span = tracing::info_span!(
        "chat_session",
        session_id = %session.session_id,
        user_id = %session.user_id,
        model = %session.model,
        billed,
    );

    let (meter, flush_errors) = StreamMeter::new(session, state.meter_config(), state.ledger());
    let (frames, receiver) = mpsc::channel(FRAME_BUFFER);
    let cancel = CancellationToken::new();

    let chat = ChatSession {
        provider,
        request: CompletionRequest {
            messages,
            tools: router.offered(),
        },
        meter,
        flush_errors,
        router,
        frames,
        cancel: cancel.clone(),
        summary_chunk_chars: state.summary_chunk_chars(),
        summary_chunk_delay: state.summary_chunk_delay(),
    };
    tokio::spawn(chat.run().instrument(span));

    Ok(Sse::new(frame_stream(receiver, cancel.drop_guard()))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Bare pre-flight for clients that send `OPTIONS` without CORS headers
pub async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

/// Response body stream; dropping it (client gone) cancels the producer
fn frame_stream(
    receiver: mpsc::Receiver<Frame>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        let frame = receiver.recv().await?;
        let event = frame.to_event().unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode frame");
            Event::default().data(r#"{"error":"internal_error"}"#)
        });
        Some((Ok(event), (receiver, guard)))
    })
}

fn parse_request(body: &[u8]) -> Result<ChatRequest, GatewayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("body is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(GatewayError::BadRequest("body must be a JSON object".to_owned()));
    }

    if !value
        .get("model")
        .and_then(Value::as_str)
        .is_some_and(|model| !model.trim().is_empty())
    {
        return Err(GatewayError::BadRequest("`model` must be a non-empty string".to_owned()));
    }

    if !value.get("messages").is_some_and(Value::is_array) {
        return Err(GatewayError::BadRequest("`messages` must be an array".to_owned()));
    }

    serde_json::from_value(value).map_err(|e| GatewayError::BadRequest(e.to_string()))
}

#[derive(Default)]
struct PersonaContext {
    system_prompt: Option<String>,
    tools: Vec<Tool>,
}

/// Look up the persona's prompt and the tools the caller may use
///
/// Registry failures are logged and the chat proceeds without tools.
async fn discover_persona(state: &GatewayState, persona_id: Option<&str>, principal: &Principal) -> PersonaContext {
    let (Some(registry), Some(persona_id)) = (state.registry(), persona_id) else {
        return PersonaContext::default();
    };

    let persona = match registry.persona(persona_id).await {
        Ok(Some(persona)) => persona,
        Ok(None) => {
            tracing::debug!(persona_id, "persona not found");
            return PersonaContext::default();
        }
        Err(e) => {
            tracing::warn!(persona_id, error = %e, "persona lookup failed, continuing without tools");
            return PersonaContext::default();
        }
    };

    let tools = if persona.tool_ids.is_empty() {
        Vec::new()
    } else {
        match registry.tools(&persona.tool_ids).await {
            Ok(tools) => EntitlementGate::filter_tools(principal, tools),
            Err(e) => {
                tracing::warn!(persona_id, error = %e, "tool lookup failed, continuing without tools");
                Vec::new()
            }
        }
    };

    PersonaContext {
        system_prompt: persona.system_prompt,
        tools,
    }
}
