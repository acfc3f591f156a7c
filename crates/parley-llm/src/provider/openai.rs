//! OpenAI-compatible provider

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{ChatProvider, EventStream, endpoint, send};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiStreamChunk, OpenAiStreamState};
use crate::types::{CompletionRequest, ProviderConfig, ProviderFamily, StreamEvent};

/// Whether the base URL points at the canonical `OpenAI` API
///
/// Compatible third-party APIs often reject `stream_options`.
fn is_canonical_openai(config: &ProviderConfig) -> bool {
    config.base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub const fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAi
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError> {
        let wire_request = OpenAiRequest::new(request, &self.config, is_canonical_openai(&self.config));

        let builder = self
            .client
            .post(endpoint(&self.config.base_url, "chat/completions"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&wire_request);

        let response = send(self.family(), builder).await?;

        let mut state = OpenAiStreamState::default();
        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(move |result| -> Vec<Result<StreamEvent, LlmError>> {
                match result {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data == "[DONE]" {
                            return state.on_done().into_iter().map(Ok).collect();
                        }

                        match serde_json::from_str::<OpenAiStreamChunk>(data) {
                            Ok(chunk) => state.on_chunk(chunk).into_iter().map(Ok).collect(),
                            Err(e) => {
                                tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
                                vec![]
                            }
                        }
                    }
                    Err(e) => vec![Err(LlmError::Streaming(e.to_string()))],
                }
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use parley_core::{ChatMessage, MessageRole, RawFunction, RawToolCall};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::TokenUsage;

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(
            Client::new(),
            ProviderConfig {
                family: ProviderFamily::OpenAi,
                base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
                api_key: "sk-test".into(),
                model: "gpt-3.5-turbo".to_owned(),
                max_tokens: 256,
                temperature: 0.7,
                streaming: true,
            },
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::new(MessageRole::User, "hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn streams_tokens_tool_calls_and_done() {
        let server = MockServer::start().await;
        let body = [
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"current_time","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#,
            "data: [DONE]",
        ]
        .map(|line| format!("{line}\n\n"))
        .concat();

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let events: Vec<StreamEvent> = provider(&server)
            .stream(&request())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hel".to_owned()),
                StreamEvent::Token("lo".to_owned()),
                StreamEvent::ToolCall(RawToolCall::Function {
                    id: Some("call_1".to_owned()),
                    function: RawFunction {
                        name: "current_time".to_owned(),
                        arguments: json!("{}"),
                    },
                }),
                StreamEvent::Usage(TokenUsage {
                    prompt_tokens: 3,
                    completion_tokens: 2
                }),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let Err(err) = provider(&server).stream(&request()).await else {
            panic!("expected upstream error");
        };

        assert!(matches!(err, LlmError::Upstream(ref message) if message.contains("401")));
    }
}
