#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod chat;
mod cors;
pub mod error;
mod frame;
mod health;
mod models;
mod session;
mod state;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use parley_config::Config;
use tower_http::trace::TraceLayer;

pub use error::GatewayError;
pub use frame::{Frame, UsageFrame};
pub use models::{ModelInfo, ModelList};
pub use state::GatewayState;

/// Assembled gateway with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server and its collaborators from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a required section is missing or a client cannot
    /// be built
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let state = GatewayState::from_config(config)?;
        Ok(Self::with_state(config, state))
    }

    /// Build the server around already-constructed collaborators
    pub fn with_state(config: &Config, state: GatewayState) -> Self {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));

        let mut app = Router::new()
            .route(
                "/v1/chat",
                post(chat::chat_handler)
                    .options(chat::preflight_handler)
                    .fallback(chat::method_not_allowed),
            )
            .route("/v1/models", get(models::list_models))
            .with_state(state);

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, get(health::health_handler));
        }

        // Innermost first
        app = app
            .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(cors::cors_layer(config.server.cors.as_ref()));

        Self {
            router: app,
            listen_address,
        }
    }

    /// Get the configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered. Open chat streams
    /// are allowed to finish reconciling before the listener closes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
