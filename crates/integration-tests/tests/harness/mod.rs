#![allow(dead_code)]

pub mod config;
pub mod mock_identity;
pub mod mock_ledger;
pub mod mock_llm;
pub mod mock_registry;
pub mod server;
pub mod sse;

use std::net::SocketAddr;

use axum::Router;
use tokio_util::sync::CancellationToken;

/// Serve `app` on an ephemeral port until the returned token is cancelled
pub async fn spawn(app: Router) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_clone.cancelled().await;
            })
            .await
            .ok();
    });

    Ok((addr, shutdown))
}
