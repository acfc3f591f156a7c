use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::BillingError;

/// Consecutive failures before the circuit opens
const FAILURE_THRESHOLD: u32 = 3;

/// How long the circuit stays open before letting a probe through
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Short-circuits ledger calls while the ledger is unreachable
#[derive(Clone, Default)]
pub(crate) struct CircuitBreaker {
    state: Arc<Mutex<CircuitState>>,
}

#[derive(Default)]
struct CircuitState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `BillingError::CircuitOpen` while the circuit is open and the
    /// recovery timeout has not elapsed
    pub(crate) fn check(&self) -> Result<(), BillingError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match state.opened_at {
            Some(opened_at) if opened_at.elapsed() < RECOVERY_TIMEOUT => Err(BillingError::CircuitOpen),
            _ => Ok(()),
        }
    }

    /// The ledger answered; close the circuit
    pub(crate) fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    /// The ledger did not answer; a failed probe restarts the recovery timer
    pub(crate) fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.consecutive_failures >= FAILURE_THRESHOLD {
            state.opened_at = Some(Instant::now());
        }
    }
}
