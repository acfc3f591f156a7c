//! Billing instruments
//!
//! Instruments bind to the global meter provider on first use; with no
//! exporter configured they are no-ops.

use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

pub const CREDITS_DEBITED: &str = "parley.billing.credits_debited";
pub const FLUSH_FAILURES: &str = "parley.billing.flush_failures";
pub const INSUFFICIENT_CREDITS: &str = "parley.billing.insufficient_credits";
pub const TOOL_CALLS: &str = "parley.tools.calls";
pub const SPENDS_DROPPED: &str = "parley.spend_queue.dropped";
pub const STREAM_DURATION: &str = "parley.stream.duration";

/// Where a debit originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitSource {
    /// Batched streaming flush
    Flush,
    /// End-of-stream reconciliation
    Final,
    /// Tool execution cost
    Tool,
    /// Offline queue replay
    Replay,
}

impl DebitSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::Final => "final",
            Self::Tool => "tool",
            Self::Replay => "replay",
        }
    }
}

pub struct BillingMetrics {
    credits_debited: Counter<u64>,
    flush_failures: Counter<u64>,
    insufficient_credits: Counter<u64>,
    tool_calls: Counter<u64>,
    spends_dropped: Counter<u64>,
    stream_duration: Histogram<f64>,
}

impl BillingMetrics {
    /// Process-wide instruments
    pub fn global() -> &'static Self {
        static METRICS: OnceLock<BillingMetrics> = OnceLock::new();
        METRICS.get_or_init(|| {
            let meter = opentelemetry::global::meter("parley");
            Self {
                credits_debited: meter.u64_counter(CREDITS_DEBITED).with_unit("{credit}").build(),
                flush_failures: meter.u64_counter(FLUSH_FAILURES).build(),
                insufficient_credits: meter.u64_counter(INSUFFICIENT_CREDITS).build(),
                tool_calls: meter.u64_counter(TOOL_CALLS).build(),
                spends_dropped: meter.u64_counter(SPENDS_DROPPED).build(),
                stream_duration: meter.f64_histogram(STREAM_DURATION).with_unit("s").build(),
            }
        })
    }

    pub fn record_debit(&self, amount: u64, source: DebitSource) {
        self.credits_debited
            .add(amount, &[KeyValue::new("source", source.as_str())]);
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures.add(1, &[]);
    }

    pub fn record_insufficient_credits(&self, source: DebitSource) {
        self.insufficient_credits
            .add(1, &[KeyValue::new("source", source.as_str())]);
    }

    pub fn record_tool_call(&self, tool: &str, success: bool) {
        self.tool_calls.add(
            1,
            &[KeyValue::new("tool", tool.to_owned()), KeyValue::new("success", success)],
        );
    }

    pub fn record_dropped_spend(&self) {
        self.spends_dropped.add(1, &[]);
    }

    pub fn record_stream(&self, model: &str, duration: Duration, outcome: &'static str) {
        self.stream_duration.record(
            duration.as_secs_f64(),
            &[KeyValue::new("model", model.to_owned()), KeyValue::new("outcome", outcome)],
        );
    }
}
