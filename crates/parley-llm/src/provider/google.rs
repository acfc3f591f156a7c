//! Google Gemini provider

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{StreamExt, stream};
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{ChatProvider, EventStream, endpoint, send};
use crate::error::LlmError;
use crate::protocol::google::{GoogleRequest, GoogleResponse, google_chunk_to_events};
use crate::types::{CompletionRequest, ProviderConfig, ProviderFamily, StreamEvent};

pub struct GoogleProvider {
    client: Client,
    config: ProviderConfig,
}

impl GoogleProvider {
    pub const fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn stream_url(&self) -> String {
        endpoint(
            &self.config.base_url,
            &format!("models/{}:streamGenerateContent?alt=sse", self.config.model),
        )
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError> {
        let wire_request = GoogleRequest::new(request, &self.config);

        let builder = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&wire_request);

        let response = send(self.family(), builder).await?;

        // Gemini has no terminal sentinel; the end of the body is the end of the stream
        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(|result| -> Vec<Result<StreamEvent, LlmError>> {
                match result {
                    Ok(event) => match serde_json::from_str::<GoogleResponse>(&event.data) {
                        Ok(chunk) => google_chunk_to_events(chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                            vec![]
                        }
                    },
                    Err(e) => vec![Err(LlmError::Streaming(e.to_string()))],
                }
            })
            .flat_map(stream::iter)
            .chain(stream::once(async { Ok(StreamEvent::Done) }));

        Ok(Box::pin(mapped))
    }
}
