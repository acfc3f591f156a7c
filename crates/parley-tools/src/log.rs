use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Record of a successful tool execution, unique per `(user_id, call_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallLogEntry {
    pub user_id: String,
    pub tool_id: String,
    pub call_id: String,
    pub arguments: Value,
    pub result: Value,
    pub tokens_spent: u64,
}

/// Store backing idempotent tool execution
#[async_trait]
pub trait ToolCallLog: Send + Sync {
    async fn lookup(&self, user_id: &str, call_id: &str) -> Result<Option<ToolCallLogEntry>, ToolError>;

    /// Persist an entry; the first record for a key wins
    async fn record(&self, entry: &ToolCallLogEntry) -> Result<(), ToolError>;
}

/// Process-local tool-call log
#[derive(Debug, Default)]
pub struct MemoryToolCallLog {
    entries: DashMap<(String, String), ToolCallLogEntry>,
}

impl MemoryToolCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ToolCallLog for MemoryToolCallLog {
    async fn lookup(&self, user_id: &str, call_id: &str) -> Result<Option<ToolCallLogEntry>, ToolError> {
        Ok(self
            .entries
            .get(&(user_id.to_owned(), call_id.to_owned()))
            .map(|entry| entry.value().clone()))
    }

    async fn record(&self, entry: &ToolCallLogEntry) -> Result<(), ToolError> {
        self.entries
            .entry((entry.user_id.clone(), entry.call_id.clone()))
            .or_insert_with(|| entry.clone());
        Ok(())
    }
}
