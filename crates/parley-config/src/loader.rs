use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a service credential is empty or a metering
    /// parameter is out of range
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_service_keys()?;
        self.billing.validate().map_err(|e| anyhow::anyhow!(e))?;
        self.validate_spend_queue()?;
        self.validate_models()?;
        Ok(())
    }

    fn validate_service_keys(&self) -> anyhow::Result<()> {
        if let Some(ref identity) = self.identity
            && identity.service_key.expose_secret().is_empty()
        {
            anyhow::bail!("identity.service_key must not be empty");
        }

        if let Some(ref identity) = self.identity
            && identity.cache_ttl_seconds == 0
        {
            anyhow::bail!("identity.cache_ttl_seconds must be greater than 0");
        }

        if let Some(ref ledger) = self.ledger
            && ledger.service_key.expose_secret().is_empty()
        {
            anyhow::bail!("ledger.service_key must not be empty");
        }

        Ok(())
    }

    fn validate_spend_queue(&self) -> anyhow::Result<()> {
        let Some(ref queue) = self.spend_queue else {
            return Ok(());
        };

        if queue.max_retries == 0 {
            anyhow::bail!("spend_queue.max_retries must be greater than 0");
        }

        if queue.user_id.trim().is_empty() {
            anyhow::bail!("spend_queue.user_id must not be empty");
        }

        if self.ledger.is_none() {
            anyhow::bail!("spend_queue requires a [ledger] section");
        }

        Ok(())
    }

    fn validate_models(&self) -> anyhow::Result<()> {
        for (id, model) in &self.models {
            if model.max_tokens == Some(0) {
                anyhow::bail!("models.{id}.max_tokens must be greater than 0");
            }

            if let Some(temperature) = model.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                anyhow::bail!("models.{id}.temperature must be between 0 and 2");
            }
        }

        Ok(())
    }
}
