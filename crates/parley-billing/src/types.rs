use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ledger spend RPC body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRequest {
    /// Account to debit
    pub user_id: String,
    /// Whole credits to debit
    pub amount: u64,
    /// Submissions sharing a key are one transaction
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl SpendRequest {
    pub fn new(user_id: impl Into<String>, amount: u64, idempotency_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            idempotency_key: idempotency_key.into(),
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            description: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_tokens(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = Some(prompt_tokens);
        self.completion_tokens = Some(completion_tokens);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}

/// Successful spend acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendReceipt {
    /// Balance after the debit
    pub remaining: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Lifecycle of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendStatus {
    Pending,
    Completed,
    Failed,
}

/// Ledger-side record of one idempotent spend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendTransaction {
    pub idempotency_key: String,
    pub user_id: String,
    pub amount: u64,
    pub model: Option<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub status: SpendStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SpendTransaction {
    pub(crate) fn pending(request: &SpendRequest) -> Self {
        Self {
            idempotency_key: request.idempotency_key.clone(),
            user_id: request.user_id.clone(),
            amount: request.amount,
            model: request.model.clone(),
            prompt_tokens: request.prompt_tokens,
            completion_tokens: request.completion_tokens,
            status: SpendStatus::Pending,
            metadata: request.metadata.clone(),
        }
    }
}
