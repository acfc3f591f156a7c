use http::StatusCode;
use parley_core::HttpError;
use thiserror::Error;

/// Errors raised while talking to an upstream provider
#[derive(Debug, Error)]
pub enum LlmError {
    /// Upstream provider rejected the request or could not be reached
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error while reading the event stream
    #[error("streaming error: {0}")]
    Streaming(String),
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }

    fn error_code(&self) -> &str {
        match self {
            Self::Upstream(_) => "upstream_error",
            Self::Streaming(_) => "streaming_error",
        }
    }
}

/// Reasons a model id cannot be turned into a provider configuration
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No provider family handles this model id
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// Neither a server-held nor an entitled custom key is available
    #[error("no credential configured for {family} (model {model})")]
    MissingCredential { family: &'static str, model: String },
}

impl HttpError for DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedModel { .. } => StatusCode::BAD_REQUEST,
            Self::MissingCredential { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Self::UnsupportedModel { .. } => "unsupported_model",
            Self::MissingCredential { .. } => "provider_not_configured",
        }
    }
}
