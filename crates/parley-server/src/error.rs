use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use parley_auth::AuthError;
use parley_core::HttpError;
use parley_llm::DispatchError;

/// Failures that end a chat request before any stream opens
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Body is not a valid chat request
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Body could not be read, e.g. it exceeds the size limit
    #[error("unreadable body: {0}")]
    Body(#[from] BytesRejection),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Model requires an entitlement the caller lacks
    #[error("premium_required")]
    PremiumRequired,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Body(e) => e.status(),
            Self::Auth(e) => e.status_code(),
            Self::PremiumRequired => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Dispatch(e) => e.status_code(),
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Self::BadRequest(_) => "invalid_request",
            Self::Body(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            Self::Body(_) => "invalid_request",
            Self::Auth(e) => e.error_code(),
            Self::PremiumRequired => "premium_required",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Dispatch(e) => e.error_code(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::BadRequest(_) => self.to_string(),
            _ => self.error_code().to_owned(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "chat request failed");
        } else {
            tracing::debug!(error = %self, "chat request rejected");
        }

        let body = serde_json::json!({ "error": self.client_message() });
        (status, Json(body)).into_response()
    }
}
