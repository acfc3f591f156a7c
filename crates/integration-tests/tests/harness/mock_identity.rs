//! Mock identity provider
//!
//! Known tokens:
//! - `free-token`: `usr_free`, no entitlements
//! - `sub-token`: `usr_sub`, active subscriber
//! - `key-token`: `usr_key`, registered custom provider key

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub struct MockIdentity {
    addr: SocketAddr,
    shutdown: CancellationToken,
    calls: Arc<AtomicU32>,
}

#[derive(Deserialize)]
struct VerifyRequest {
    token: String,
}

impl MockIdentity {
    pub async fn start() -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));

        let app = Router::new()
            .route("/verify", routing::post(handle_verify))
            .with_state(Arc::clone(&calls));

        let (addr, shutdown) = super::spawn(app).await?;
        Ok(Self { addr, shutdown, calls })
    }

    pub fn verify_url(&self) -> String {
        format!("http://{}/verify", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Drop for MockIdentity {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_verify(State(calls): State<Arc<AtomicU32>>, Json(request): Json<VerifyRequest>) -> impl IntoResponse {
    calls.fetch_add(1, Ordering::Relaxed);

    let claims = match request.token.as_str() {
        "free-token" => json!({"user_id": "usr_free"}),
        "sub-token" => json!({"user_id": "usr_sub", "subscriber": true}),
        "key-token" => json!({"user_id": "usr_key", "has_custom_key": true}),
        _ => return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"}))),
    };

    (StatusCode::OK, Json(claims))
}
