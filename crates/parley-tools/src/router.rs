//! Tool-call execution for one request
//!
//! Each call is resolved, gated, validated, checked against the call log,
//! debited and executed on its own. A failure becomes that call's result
//! and never stops the rest of the batch.

use std::sync::Arc;

use indexmap::IndexMap;
use parley_auth::EntitlementGate;
use parley_billing::{Ledger, SpendRequest};
use parley_core::{Principal, RawToolCall, ToolInvocation};
use parley_llm::ToolSpec;
use parley_telemetry::metrics::{BillingMetrics, DebitSource};
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::executor::ToolExecutor;
use crate::log::{ToolCallLog, ToolCallLogEntry};
use crate::schema::validate_args;
use crate::tool::Tool;

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    /// Tool output, or the reason the call failed
    pub output: Result<Value, String>,
    /// Credits debited by this call in this batch
    pub tokens_spent: u64,
    /// Served from the call log without re-execution
    pub replayed: bool,
}

impl ToolResult {
    /// JSON text re-injected into the conversation
    pub fn content(&self) -> String {
        match &self.output {
            Ok(value) => value.to_string(),
            Err(message) => json!({ "error": message }).to_string(),
        }
    }

    pub const fn is_error(&self) -> bool {
        self.output.is_err()
    }
}

/// Results in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolBatch {
    pub results: Vec<ToolResult>,
    pub total_tokens_spent: u64,
}

/// Executes the tool calls a model emits during one request
pub struct ToolRouter {
    principal: Principal,
    tools: IndexMap<String, Tool>,
    ledger: Arc<dyn Ledger>,
    log: Arc<dyn ToolCallLog>,
    executor: ToolExecutor,
}

impl ToolRouter {
    pub fn new(
        principal: Principal,
        tools: Vec<Tool>,
        ledger: Arc<dyn Ledger>,
        log: Arc<dyn ToolCallLog>,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            principal,
            tools: tools.into_iter().map(|tool| (tool.name.clone(), tool)).collect(),
            ledger,
            log,
            executor,
        }
    }

    /// Tools offered to the model; premium tools are hidden from callers
    /// without entitlement
    pub fn offered(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|tool| EntitlementGate::allows(&self.principal, *tool))
            .map(Tool::spec)
            .collect()
    }

    /// Process a batch sequentially, preserving input order
    pub async fn process_tool_calls(&self, calls: Vec<RawToolCall>) -> ToolBatch {
        let mut batch = ToolBatch::default();

        for call in calls {
            let invocation = call.normalize(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            let result = self.process(invocation).await;

            batch.total_tokens_spent += result.tokens_spent;
            batch.results.push(result);
        }

        batch
    }

    async fn process(&self, invocation: ToolInvocation) -> ToolResult {
        let mut tokens_spent = 0;
        let outcome = self.run(&invocation, &mut tokens_spent).await;

        let (output, replayed) = match outcome {
            Ok((value, replayed)) => (Ok(value), replayed),
            Err(e) => {
                tracing::warn!(
                    user_id = %self.principal.user_id,
                    tool = %invocation.name,
                    call_id = %invocation.call_id,
                    error = %e,
                    "tool call failed"
                );
                (Err(e.to_string()), false)
            }
        };

        BillingMetrics::global().record_tool_call(&invocation.name, output.is_ok());

        ToolResult {
            call_id: invocation.call_id,
            name: invocation.name,
            output,
            tokens_spent,
            replayed,
        }
    }

    async fn run(&self, invocation: &ToolInvocation, tokens_spent: &mut u64) -> Result<(Value, bool), ToolError> {
        let user_id = &self.principal.user_id;

        let tool = self
            .tools
            .get(&invocation.name)
            .ok_or_else(|| ToolError::NotFound(invocation.name.clone()))?;

        if !EntitlementGate::allows(&self.principal, tool) {
            return Err(ToolError::PremiumRequired);
        }

        validate_args(&tool.json_schema, &invocation.args).map_err(ToolError::InvalidArguments)?;

        match self.log.lookup(user_id, &invocation.call_id).await {
            Ok(Some(entry)) => {
                tracing::debug!(call_id = %invocation.call_id, "replaying logged tool result");
                return Ok((entry.result, true));
            }
            Ok(None) => {}
            // The debit key is deterministic, so a missed lookup cannot double-charge
            Err(e) => tracing::warn!(error = %e, "tool call log lookup failed"),
        }

        if tool.cost_tokens > 0 && !self.principal.is_billing_exempt() {
            self.debit(tool, &invocation.call_id).await?;
            *tokens_spent = tool.cost_tokens;
        }

        // Debits are not refunded when execution fails
        let result = self.executor.execute(tool, &invocation.args).await?;

        let entry = ToolCallLogEntry {
            user_id: user_id.clone(),
            tool_id: tool.id.clone(),
            call_id: invocation.call_id.clone(),
            arguments: invocation.args.clone(),
            result: result.clone(),
            tokens_spent: *tokens_spent,
        };
        if let Err(e) = self.log.record(&entry).await {
            tracing::warn!(call_id = %invocation.call_id, error = %e, "failed to record tool call");
        }

        tracing::info!(
            user_id = %user_id,
            tool = %tool.name,
            call_id = %invocation.call_id,
            tokens_spent = *tokens_spent,
            "tool executed"
        );

        Ok((result, false))
    }

    async fn debit(&self, tool: &Tool, call_id: &str) -> Result<(), ToolError> {
        let user_id = &self.principal.user_id;
        let request = SpendRequest::new(user_id.clone(), tool.cost_tokens, format!("tool-{user_id}-{call_id}"))
            .with_description(format!("tool:{}", tool.name))
            .with_metadata("tool_id", tool.id.clone())
            .with_metadata("call_id", call_id);

        let metrics = BillingMetrics::global();
        match self.ledger.spend(&request).await {
            Ok(_) => {
                metrics.record_debit(tool.cost_tokens, DebitSource::Tool);
                Ok(())
            }
            Err(e) => {
                if e.is_insufficient_credits() {
                    metrics.record_insufficient_credits(DebitSource::Tool);
                }
                Err(ToolError::Billing(e))
            }
        }
    }
}
