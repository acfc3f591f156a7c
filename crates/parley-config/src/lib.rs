#![allow(clippy::must_use_candidate)]

pub mod billing;
pub mod cors;
mod env;
pub mod health;
pub mod identity;
pub mod ledger;
mod loader;
pub mod providers;
pub mod registry;
pub mod server;
pub mod spend_queue;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use billing::*;
pub use cors::*;
pub use health::*;
pub use identity::*;
pub use ledger::*;
pub use providers::*;
pub use registry::*;
pub use server::*;
pub use spend_queue::*;
pub use telemetry::*;

/// Top-level Parley configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Bearer-token verification service
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
    /// Credit ledger spend endpoint
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    /// Persona and tool registry
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    /// Server-held upstream provider credentials
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Per-model overrides keyed by public model id
    #[serde(default)]
    pub models: IndexMap<String, ModelOverride>,
    /// Streaming metering parameters
    #[serde(default)]
    pub billing: BillingConfig,
    /// Client-side offline spend queue
    #[serde(default)]
    pub spend_queue: Option<SpendQueueConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
