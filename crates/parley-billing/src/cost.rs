//! Credit pricing and token estimation
//!
//! Every function here rounds toward the user paying slightly more, never
//! less.

/// Credits per 1,000 tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Rate charged for models missing from the price table
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(10.0, 30.0);

const PRICE_TABLE: &[(&str, ModelPricing)] = &[
    ("gpt-3.5-turbo", ModelPricing::new(1.0, 2.0)),
    ("gpt-4", ModelPricing::new(30.0, 60.0)),
    ("gpt-4o", ModelPricing::new(5.0, 15.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
    ("claude-3-opus", ModelPricing::new(15.0, 75.0)),
    ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0)),
    ("claude-3-haiku", ModelPricing::new(0.25, 1.25)),
    ("gemini-1.5-pro", ModelPricing::new(3.5, 10.5)),
    ("gemini-1.5-flash", ModelPricing::new(0.35, 1.05)),
];

/// Characters per token for Claude-family tokenizers
pub const CLAUDE_CHARS_PER_TOKEN: f64 = 3.5;

/// Characters per token for every other family
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Pricing for a model id, falling back to [`DEFAULT_PRICING`]
pub fn pricing(model: &str) -> ModelPricing {
    known_pricing(model).unwrap_or(DEFAULT_PRICING)
}

/// Pricing for a model id present in the price table
pub fn known_pricing(model: &str) -> Option<ModelPricing> {
    PRICE_TABLE
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, pricing)| *pricing)
}

/// Model ids with an explicit price
pub fn priced_models() -> impl Iterator<Item = (&'static str, ModelPricing)> {
    PRICE_TABLE.iter().copied()
}

/// Accurate characters-per-token ratio for a model family
pub fn chars_per_token(model: &str) -> f64 {
    if model.starts_with("claude") {
        CLAUDE_CHARS_PER_TOKEN
    } else {
        DEFAULT_CHARS_PER_TOKEN
    }
}

/// Estimate the token count of `text`, rounded up
pub fn estimate_tokens(text: &str, model: &str) -> u64 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tokens = (chars as f64 / chars_per_token(model)).ceil() as u64;
    tokens
}

/// Credit cost of a completed exchange, rounded up to whole credits
pub fn calculate_token_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> u64 {
    let pricing = pricing(model);

    #[allow(clippy::cast_precision_loss)]
    let raw = (prompt_tokens as f64 / 1000.0).mul_add(
        pricing.input_per_1k,
        completion_tokens as f64 / 1000.0 * pricing.output_per_1k,
    );

    credits_ceil(raw)
}

/// Cost of a streamed exchange given the full completion text
pub fn calculate_streaming_cost(model: &str, prompt_tokens: u64, completion_text: &str) -> u64 {
    calculate_token_cost(model, prompt_tokens, estimate_tokens(completion_text, model))
}

/// Upper-bound cost of a request before generation starts
///
/// Assumes the model produces `max_completion_tokens`.
pub fn estimate_request_cost(model: &str, prompt_text: &str, max_completion_tokens: u64) -> u64 {
    calculate_token_cost(model, estimate_tokens(prompt_text, model), max_completion_tokens)
}

/// Running per-chunk estimate used while streaming
///
/// Prices completion text at `chars_per_token_estimate` characters per
/// token; any ratio below the family's accurate ratio overestimates.
pub fn heuristic_completion_cost(model: &str, text: &str, chars_per_token_estimate: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let tokens = text.chars().count() as f64 / chars_per_token_estimate;
    tokens * pricing(model).output_per_1k / 1000.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn credits_ceil(raw: f64) -> u64 {
    // Prices are multiples of 1e-5 credits per token; 1e-9 only absorbs float noise
    let rounded = (raw - 1e-9).ceil();
    if rounded <= 0.0 { 0 } else { rounded as u64 }
}
