//! Configuration builder for integration tests
//!
//! Renders TOML and loads it through `Config::from_toml`, so tests also
//! exercise parsing and validation.

use parley_config::Config;

use super::mock_identity::MockIdentity;
use super::mock_ledger::MockLedger;
use super::mock_llm::MockLlm;
use super::mock_registry::{self, MockRegistry};

pub struct ConfigBuilder {
    sections: Vec<String>,
}

impl ConfigBuilder {
    /// Gateway wired to the mock identity provider and ledger
    pub fn new(identity: &MockIdentity, ledger: &MockLedger) -> Self {
        Self {
            sections: vec![
                "[server]\nlisten_address = \"127.0.0.1:0\"".to_owned(),
                format!(
                    "[identity]\nverify_url = \"{}\"\nservice_key = \"sk-identity\"",
                    identity.verify_url()
                ),
                format!(
                    "[ledger]\nspend_url = \"{}\"\nservice_key = \"sk-ledger\"",
                    ledger.spend_url()
                ),
            ],
        }
    }

    /// Point the OpenAI family at a mock backend
    pub fn with_openai(mut self, llm: &MockLlm) -> Self {
        self.sections.push(format!(
            "[providers.openai]\napi_key = \"sk-server\"\nbase_url = \"{}\"",
            llm.base_url()
        ));
        self
    }

    pub fn with_registry(mut self, registry: &MockRegistry) -> Self {
        self.sections.push(format!(
            "[registry]\nbase_url = \"{}\"\nservice_key = \"{}\"",
            registry.base_url(),
            mock_registry::SERVICE_KEY
        ));
        self
    }

    /// Append a raw TOML section
    pub fn with_section(mut self, toml: &str) -> Self {
        self.sections.push(toml.to_owned());
        self
    }

    pub fn build(self) -> Config {
        Config::from_toml(&self.sections.join("\n\n")).unwrap()
    }
}
