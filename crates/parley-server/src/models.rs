use axum::Json;
use axum::extract::State;
use parley_billing::cost;
use parley_llm::dispatcher::family_for;
use serde::Serialize;

use crate::state::GatewayState;

/// One entry of `GET /v1/models`
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub provider: &'static str,
    /// Requires a subscription or custom key
    pub premium: bool,
    /// Credits per 1,000 prompt tokens
    pub input_per_1k: f64,
    /// Credits per 1,000 completion tokens
    pub output_per_1k: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub data: Vec<ModelInfo>,
}

/// List priced models with their gating so clients can grey out premium ones
pub async fn list_models(State(state): State<GatewayState>) -> Json<ModelList> {
    let data = cost::priced_models()
        .filter_map(|(id, pricing)| {
            let family = family_for(id)?;
            Some(ModelInfo {
                id,
                provider: family.as_str(),
                premium: state.gate().is_premium(id),
                input_per_1k: pricing.input_per_1k,
                output_per_1k: pricing.output_per_1k,
            })
        })
        .collect();

    Json(ModelList { data })
}
