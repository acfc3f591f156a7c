//! Mock ledger speaking the spend RPC over HTTP
//!
//! Backed by `MemoryLedger`, so idempotency and the balance floor behave
//! exactly as the real contract requires.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use parley_billing::{BillingError, Ledger, MemoryLedger, SpendRequest};
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub struct MockLedger {
    addr: SocketAddr,
    shutdown: CancellationToken,
    ledger: Arc<MemoryLedger>,
}

impl MockLedger {
    pub async fn start() -> anyhow::Result<Self> {
        let ledger = Arc::new(MemoryLedger::new());

        let app = Router::new()
            .route("/spend", routing::post(handle_spend))
            .with_state(Arc::clone(&ledger));

        let (addr, shutdown) = super::spawn(app).await?;
        Ok(Self { addr, shutdown, ledger })
    }

    pub fn spend_url(&self) -> String {
        format!("http://{}/spend", self.addr)
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }
}

impl Drop for MockLedger {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_spend(State(ledger): State<Arc<MemoryLedger>>, Json(request): Json<SpendRequest>) -> Response {
    match ledger.spend(&request).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(BillingError::InsufficientCredits) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({"error": "insufficient_credits"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
