use async_trait::async_trait;

use crate::error::BillingError;
use crate::types::{SpendReceipt, SpendRequest};

/// Transactional credit store
///
/// Implementations must apply a given idempotency key at most once and
/// reject a debit that would take the balance below zero.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Debit credits, or replay the recorded outcome for a known key
    async fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, BillingError>;
}
