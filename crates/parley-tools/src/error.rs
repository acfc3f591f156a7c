use parley_billing::BillingError;

/// Errors from tool resolution, execution and the registry
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// HTTP transport or decoding error
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Registry returned a non-success status
    #[error("registry API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No tool with this name is available to the request
    #[error("unknown tool: {0}")]
    NotFound(String),

    /// Tool needs a subscription or custom key
    #[error("premium_required")]
    PremiumRequired,

    /// Arguments do not satisfy the tool's schema
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Cost debit failed; nothing was executed
    #[error("{}", billing_message(.0))]
    Billing(BillingError),

    /// Endpoint failed or returned a non-JSON body
    #[error("tool execution failed: {0}")]
    Execution(String),
}

fn billing_message(error: &BillingError) -> String {
    if error.is_insufficient_credits() {
        "insufficient_credits".to_owned()
    } else {
        format!("billing_failed: {error}")
    }
}
