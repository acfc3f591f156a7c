use http::StatusCode;
use parley_core::HttpError;

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header
    #[error("missing bearer token")]
    MissingToken,

    /// Identity provider rejected the token
    #[error("invalid bearer token")]
    InvalidToken,

    /// HTTP request to the identity provider failed
    #[error("token verification failed: {0}")]
    VerificationFailed(#[from] reqwest::Error),

    /// Identity provider returned an unexpected response
    #[error("identity provider error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the provider
        message: String,
    },
}

impl HttpError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::VerificationFailed(_) | Self::Api { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Self::MissingToken | Self::InvalidToken => "unauthorized",
            Self::VerificationFailed(_) | Self::Api { .. } => "identity_unavailable",
        }
    }
}
