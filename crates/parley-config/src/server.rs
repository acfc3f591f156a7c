use std::net::SocketAddr;

use serde::Deserialize;

use crate::{cors::CorsConfig, health::HealthConfig};

/// HTTP listener configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind; defaults to `127.0.0.1:8000`
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    /// CORS policy; permissive when absent
    #[serde(default)]
    pub cors: Option<CorsConfig>,
    /// Maximum inbound request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

const fn default_body_limit() -> usize {
    1024 * 1024
}
