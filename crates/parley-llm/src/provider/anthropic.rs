//! Anthropic Messages API provider

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{ChatProvider, EventStream, endpoint, send};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicStreamEvent, AnthropicStreamState};
use crate::types::{CompletionRequest, ProviderConfig, ProviderFamily, StreamEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub const fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError> {
        let wire_request = AnthropicRequest::new(request, &self.config);

        let builder = self
            .client
            .post(endpoint(&self.config.base_url, "messages"))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request);

        let response = send(self.family(), builder).await?;

        let mut state = AnthropicStreamState::default();
        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(move |result| -> Vec<Result<StreamEvent, LlmError>> {
                match result {
                    Ok(event) => match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
                        Ok(parsed) => match state.on_event(parsed) {
                            Ok(events) => events.into_iter().map(Ok).collect(),
                            Err(message) => vec![Err(LlmError::Upstream(message))],
                        },
                        Err(e) => {
                            tracing::debug!(error = %e, event = %event.event, "skipping unparseable SSE event");
                            vec![]
                        }
                    },
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
    use parley_core::{ChatMessage, MessageRole};
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn sends_version_and_key_headers() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":4}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(
            Client::new(),
            ProviderConfig {
                family: ProviderFamily::Anthropic,
                base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
                api_key: "ant-test".into(),
                model: "claude-3-haiku-20240307".to_owned(),
                max_tokens: 4096,
                temperature: 0.7,
                streaming: true,
            },
        );
        let request = CompletionRequest {
            messages: vec![ChatMessage::new(MessageRole::User, "hello")],
            tools: vec![],
        };

        let events: Vec<StreamEvent> = provider.stream(&request).await.unwrap().map(Result::unwrap).collect().await;

        assert_eq!(events, vec![StreamEvent::Token("Hi".to_owned()), StreamEvent::Done]);
    }
}
