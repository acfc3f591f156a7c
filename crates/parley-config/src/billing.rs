use std::time::Duration;

use serde::Deserialize;

/// Streaming metering parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Pending credits that trigger an immediate flush
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: u64,
    /// Inactivity delay before pending credits are flushed
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Characters per token assumed by the running estimate
    #[serde(default = "default_chars_per_token_estimate")]
    pub chars_per_token_estimate: f64,
    /// Models anyone may use; every other model is premium
    #[serde(default = "default_free_models")]
    pub free_models: Vec<String>,
    /// Maximum characters per tool-summary frame
    #[serde(default = "default_summary_chunk_chars")]
    pub summary_chunk_chars: usize,
    /// Pause between tool-summary frames
    #[serde(default = "default_summary_chunk_delay_ms")]
    pub summary_chunk_delay_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            batch_threshold: default_batch_threshold(),
            flush_delay_ms: default_flush_delay_ms(),
            chars_per_token_estimate: default_chars_per_token_estimate(),
            free_models: default_free_models(),
            summary_chunk_chars: default_summary_chunk_chars(),
            summary_chunk_delay_ms: default_summary_chunk_delay_ms(),
        }
    }
}

impl BillingConfig {
    pub const fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub const fn summary_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.summary_chunk_delay_ms)
    }

    /// Validate billing configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is zero or the estimate ratio would
    /// stop overestimating
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_threshold == 0 {
            return Err("billing.batch_threshold must be greater than 0".to_owned());
        }

        if !(self.chars_per_token_estimate > 0.0 && self.chars_per_token_estimate <= 3.5) {
            return Err("billing.chars_per_token_estimate must be in (0, 3.5]".to_owned());
        }

        if self.summary_chunk_chars == 0 {
            return Err("billing.summary_chunk_chars must be greater than 0".to_owned());
        }

        Ok(())
    }
}

const fn default_batch_threshold() -> u64 {
    10
}

const fn default_flush_delay_ms() -> u64 {
    1000
}

const fn default_chars_per_token_estimate() -> f64 {
    3.0
}

fn default_free_models() -> Vec<String> {
    ["gpt-3.5-turbo", "gpt-4o-mini", "claude-3-haiku", "gemini-1.5-flash"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

const fn default_summary_chunk_chars() -> usize {
    500
}

const fn default_summary_chunk_delay_ms() -> u64 {
    20
}
