use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::BillingError;
use crate::ledger::Ledger;
use crate::types::{SpendReceipt, SpendRequest, SpendStatus, SpendTransaction};

/// In-process ledger with exact idempotency and floor-checked debits
///
/// Every spend runs under one lock, so concurrent debits for a user are
/// serialized and the balance never goes negative.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
    outcomes: HashMap<String, Outcome>,
    transactions: Vec<SpendTransaction>,
    unavailable: bool,
    calls: usize,
}

#[derive(Debug, Clone)]
enum Outcome {
    Completed(SpendReceipt),
    Rejected,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credits to an account
    pub fn credit(&self, user_id: &str, amount: u64) {
        let mut state = self.lock();
        let balance = state.balances.entry(user_id.to_owned()).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, user_id: &str) -> u64 {
        self.lock().balances.get(user_id).copied().unwrap_or_default()
    }

    /// Simulate a network partition; spends fail without being recorded
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Spend RPCs received, including replays and rejected calls
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Transaction log in submission order
    pub fn transactions(&self) -> Vec<SpendTransaction> {
        self.lock().transactions.clone()
    }

    /// Sum of completed debits for an account
    pub fn total_debited(&self, user_id: &str) -> u64 {
        self.lock()
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.status == SpendStatus::Completed)
            .map(|tx| tx.amount)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, BillingError> {
        let mut state = self.lock();
        state.calls += 1;

        if state.unavailable {
            return Err(BillingError::Unavailable("ledger partitioned".to_owned()));
        }

        if let Some(outcome) = state.outcomes.get(&request.idempotency_key) {
            return match outcome {
                Outcome::Completed(receipt) => Ok(receipt.clone()),
                Outcome::Rejected => Err(BillingError::InsufficientCredits),
            };
        }

        state.transactions.push(SpendTransaction::pending(request));
        let index = state.transactions.len() - 1;

        let balance = state.balances.get(&request.user_id).copied().unwrap_or_default();

        let Some(remaining) = balance.checked_sub(request.amount) else {
            state.transactions[index].status = SpendStatus::Failed;
            state
                .outcomes
                .insert(request.idempotency_key.clone(), Outcome::Rejected);
            return Err(BillingError::InsufficientCredits);
        };

        state.balances.insert(request.user_id.clone(), remaining);
        state.transactions[index].status = SpendStatus::Completed;

        let receipt = SpendReceipt {
            remaining,
            transaction_id: Some(format!("tx_{}", index + 1)),
        };
        state
            .outcomes
            .insert(request.idempotency_key.clone(), Outcome::Completed(receipt.clone()));

        Ok(receipt)
    }
}
