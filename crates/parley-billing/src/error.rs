use http::StatusCode;
use parley_core::HttpError;

/// Errors returned by ledger calls and the streaming meter
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// HTTP transport or decoding error
    #[error("ledger request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Ledger returned a non-success status other than a balance shortfall
    #[error("ledger API error ({status}): {message}")]
    Api {
        /// HTTP status from the ledger
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// Balance is below the requested amount; nothing was debited
    #[error("insufficient credits")]
    InsufficientCredits,

    /// Recent consecutive failures; the ledger is not being called
    #[error("ledger circuit is open")]
    CircuitOpen,

    /// Ledger could not be reached
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl BillingError {
    pub const fn is_insufficient_credits(&self) -> bool {
        matches!(self, Self::InsufficientCredits)
    }
}

impl HttpError for BillingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Self::InsufficientCredits => "insufficient_credits",
            _ => "billing_failed",
        }
    }
}
