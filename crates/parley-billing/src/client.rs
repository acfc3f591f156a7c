use async_trait::async_trait;
use parley_config::LedgerConfig;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::circuit::CircuitBreaker;
use crate::error::BillingError;
use crate::ledger::Ledger;
use crate::types::{SpendReceipt, SpendRequest};

/// Marker the ledger puts in error payloads when the balance is short
const INSUFFICIENT_CREDITS_MARKER: &str = "insufficient_credits";

/// HTTP client for the ledger spend RPC
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    spend_url: Url,
    service_key: SecretString,
    circuit: CircuitBreaker,
}

impl LedgerClient {
    /// Create a new ledger client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &LedgerConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(BillingError::Request)?;

        Ok(Self {
            http,
            spend_url: config.spend_url.clone(),
            service_key: config.service_key.clone(),
            circuit: CircuitBreaker::new(),
        })
    }

    async fn post_spend(&self, request: &SpendRequest) -> Result<SpendReceipt, BillingError> {
        let response = self
            .http
            .post(self.spend_url.clone())
            .bearer_auth(self.service_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response.text().await.unwrap_or_default();

        if status == StatusCode::PAYMENT_REQUIRED || message.contains(INSUFFICIENT_CREDITS_MARKER) {
            return Err(BillingError::InsufficientCredits);
        }

        Err(BillingError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, BillingError> {
        self.circuit.check()?;

        let result = self.post_spend(request).await;

        match &result {
            Ok(_) | Err(BillingError::InsufficientCredits) => self.circuit.record_success(),
            Err(BillingError::Api { status, .. }) if *status < 500 => self.circuit.record_success(),
            Err(_) => self.circuit.record_failure(),
        }

        result
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("spend_url", &self.spend_url)
            .finish_non_exhaustive()
    }
}
