//! Streaming clients for each provider family

pub mod anthropic;
pub mod google;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use reqwest::{RequestBuilder, Response};

use crate::error::LlmError;
use crate::types::{CompletionRequest, ProviderFamily, StreamEvent};

/// Sequence of events from one upstream completion
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Streaming chat client for one resolved provider configuration
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Upstream model name
    fn model(&self) -> &str;

    /// Open the upstream stream
    ///
    /// Fails before yielding anything when the provider rejects the
    /// request. Dropping the stream cancels the upstream read.
    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError>;
}

/// Send a streaming request and reject non-success statuses
async fn send(family: ProviderFamily, builder: RequestBuilder) -> Result<Response, LlmError> {
    let response = builder.send().await.map_err(|e| {
        tracing::error!(provider = %family, error = %e, "upstream stream request failed");
        LlmError::Upstream(e.to_string())
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(provider = %family, status = %status, "upstream returned error");
        return Err(LlmError::Upstream(format!("provider returned {status}: {body}")));
    }

    Ok(response)
}

fn endpoint(base_url: &url::Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}/{path}")
}
