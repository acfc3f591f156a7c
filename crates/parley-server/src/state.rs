use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parley_auth::{EntitlementGate, IdentityClient, IdentityVerifier};
use parley_billing::{Ledger, LedgerClient, MeterConfig};
use parley_config::Config;
use parley_llm::ProviderDispatcher;
use parley_tools::{MemoryToolCallLog, RegistryClient, ToolCallLog, ToolExecutor, ToolRegistry};

/// Shared collaborators for every chat request
///
/// Cheap to clone. Sessions share nothing mutable here; all per-user
/// state lives in the ledger and the tool-call log.
#[derive(Clone)]
pub struct GatewayState {
    identity: Arc<dyn IdentityVerifier>,
    ledger: Arc<dyn Ledger>,
    registry: Option<Arc<dyn ToolRegistry>>,
    tool_log: Arc<dyn ToolCallLog>,
    executor: ToolExecutor,
    dispatcher: ProviderDispatcher,
    gate: Arc<EntitlementGate>,
    meter: MeterConfig,
    summary_chunk_chars: usize,
    summary_chunk_delay: Duration,
}

impl GatewayState {
    /// Build every collaborator from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or ledger section is missing, or an
    /// HTTP client cannot be built
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let identity = config
            .identity
            .as_ref()
            .context("an [identity] section is required to serve chat")?;
        let ledger = config
            .ledger
            .as_ref()
            .context("a [ledger] section is required to serve chat")?;

        let identity = Arc::new(IdentityClient::new(identity)?);
        let ledger = Arc::new(LedgerClient::new(ledger)?);

        let mut state = Self::new(config, identity, ledger)?;

        if let Some(ref registry) = config.registry {
            let client = Arc::new(RegistryClient::new(registry)?);
            state.executor = ToolExecutor::new(Some((registry.base_url.clone(), registry.service_key.clone())))?;
            state = state.with_registry(client.clone(), client);
        }

        Ok(state)
    }

    /// Build with injected identity and ledger; no persona tools
    ///
    /// # Errors
    ///
    /// Returns an error if the tool executor's HTTP client cannot be built
    pub fn new(config: &Config, identity: Arc<dyn IdentityVerifier>, ledger: Arc<dyn Ledger>) -> anyhow::Result<Self> {
        Ok(Self {
            identity,
            ledger,
            registry: None,
            tool_log: Arc::new(MemoryToolCallLog::default()),
            executor: ToolExecutor::without_local_routes()?,
            dispatcher: ProviderDispatcher::new(&config.providers, &config.models),
            gate: Arc::new(EntitlementGate::from(&config.billing)),
            meter: MeterConfig::from(&config.billing),
            summary_chunk_chars: config.billing.summary_chunk_chars.max(1),
            summary_chunk_delay: config.billing.summary_chunk_delay(),
        })
    }

    /// Attach a persona/tool registry and the log backing tool idempotency
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ToolRegistry>, tool_log: Arc<dyn ToolCallLog>) -> Self {
        self.registry = Some(registry);
        self.tool_log = tool_log;
        self
    }

    pub(crate) fn identity(&self) -> &dyn IdentityVerifier {
        self.identity.as_ref()
    }

    pub(crate) fn ledger(&self) -> Arc<dyn Ledger> {
        self.ledger.clone()
    }

    pub(crate) fn registry(&self) -> Option<&dyn ToolRegistry> {
        self.registry.as_deref()
    }

    pub(crate) fn tool_log(&self) -> Arc<dyn ToolCallLog> {
        self.tool_log.clone()
    }

    pub(crate) fn executor(&self) -> ToolExecutor {
        self.executor.clone()
    }

    pub(crate) const fn dispatcher(&self) -> &ProviderDispatcher {
        &self.dispatcher
    }

    pub(crate) fn gate(&self) -> &EntitlementGate {
        &self.gate
    }

    pub(crate) const fn meter_config(&self) -> MeterConfig {
        self.meter
    }

    pub(crate) const fn summary_chunk_chars(&self) -> usize {
        self.summary_chunk_chars
    }

    pub(crate) const fn summary_chunk_delay(&self) -> Duration {
        self.summary_chunk_delay
    }
}
