//! Producer side of one streamed chat
//!
//! Runs as its own task and feeds frames to the SSE body through a bounded
//! channel. Client disconnect cancels the token held by the body, which
//! stops the upstream read; ledger calls already in flight are never
//! aborted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parley_billing::{BillingError, FinalUsage, StreamMeter};
use parley_core::{HttpError, RawToolCall};
use parley_llm::{ChatProvider, CompletionRequest, LlmError, StreamEvent, TokenUsage};
use parley_telemetry::metrics::BillingMetrics;
use parley_tools::ToolRouter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::frame::{self, Frame, UsageFrame};

const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Cancelled,
    UpstreamError,
    InsufficientCredits,
    BillingFailed,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::UpstreamError => "upstream_error",
            Self::InsufficientCredits => "insufficient_credits",
            Self::BillingFailed => "billing_failed",
        }
    }
}

pub(crate) struct ChatSession {
    pub(crate) provider: Arc<dyn ChatProvider>,
    pub(crate) request: CompletionRequest,
    pub(crate) meter: StreamMeter,
    pub(crate) flush_errors: mpsc::UnboundedReceiver<BillingError>,
    pub(crate) router: ToolRouter,
    pub(crate) frames: mpsc::Sender<Frame>,
    pub(crate) cancel: CancellationToken,
    pub(crate) summary_chunk_chars: usize,
    pub(crate) summary_chunk_delay: Duration,
}

impl ChatSession {
    pub(crate) async fn run(mut self) {
        let started = Instant::now();
        let outcome = self.drive().await;

        let session = self.meter.session();
        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            model = %session.model,
            outcome = outcome.as_str(),
            total_spent = self.meter.total_spent(),
            "chat stream closed"
        );
        BillingMetrics::global().record_stream(&session.model, started.elapsed(), outcome.as_str());
    }

    async fn drive(&mut self) -> Outcome {
        let opened = tokio::select! {
            () = self.cancel.cancelled() => return Outcome::Cancelled,
            opened = self.provider.stream(&self.request) => opened,
        };

        let mut upstream = match opened {
            Ok(upstream) => upstream,
            Err(e) => return self.upstream_failed(&e).await,
        };

        let mut tool_calls = Vec::new();
        let mut reported = None;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return self.cancelled().await,
                Some(error) = self.flush_errors.recv() => return self.billing_failed(&error).await,
                event = upstream.next() => match event {
                    Some(Ok(StreamEvent::Token(text))) => {
                        if !frame::is_forwardable(&text) {
                            continue;
                        }
                        self.meter.accumulate_text(&text);
                        if !self.emit(Frame::token(text)).await {
                            return self.cancelled().await;
                        }
                    }
                    Some(Ok(StreamEvent::ToolCall(call))) => tool_calls.push(call),
                    Some(Ok(StreamEvent::Usage(usage))) => reported = Some(usage),
                    Some(Ok(StreamEvent::Done)) | None => break,
                    Some(Err(e)) => return self.upstream_failed(&e).await,
                },
            }
        }

        drop(upstream);

        if !tool_calls.is_empty() && !self.run_tools(tool_calls).await {
            return self.cancelled().await;
        }

        self.complete(reported).await
    }

    /// Execute the batch, stream each result, then the paced summary.
    /// Returns false once the client is gone.
    async fn run_tools(&mut self, calls: Vec<RawToolCall>) -> bool {
        let batch = self.router.process_tool_calls(calls).await;

        for result in &batch.results {
            if !self.emit(Frame::tool(result)).await {
                return false;
            }
        }

        let summary = frame::summarize_tools(&batch.results);
        for (index, chunk) in frame::chunk_text(&summary, self.summary_chunk_chars).into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.summary_chunk_delay).await;
            }
            if !self.emit(Frame::token(chunk)).await {
                return false;
            }
        }

        true
    }

    async fn complete(&mut self, reported: Option<TokenUsage>) -> Outcome {
        match self.finalize().await {
            Ok(usage) => {
                self.emit(Frame::done(UsageFrame {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_cost: usage.total_cost,
                    reported_prompt_tokens: reported.map(|r| r.prompt_tokens),
                    reported_completion_tokens: reported.map(|r| r.completion_tokens),
                }))
                .await;
                Outcome::Completed
            }
            Err(e) if e.is_insufficient_credits() => {
                self.emit(Frame::error(e.error_code())).await;
                Outcome::InsufficientCredits
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.meter.session().session_id,
                    error = %e,
                    "stream reconciliation failed"
                );
                self.emit(Frame::error(e.error_code())).await;
                Outcome::BillingFailed
            }
        }
    }

    async fn cancelled(&mut self) -> Outcome {
        self.meter.cancel_timer();
        tracing::debug!(session_id = %self.meter.session().session_id, "client disconnected");

        if let Err(e) = self.finalize().await {
            tracing::warn!(
                session_id = %self.meter.session().session_id,
                error = %e,
                "could not reconcile cancelled stream"
            );
        }

        Outcome::Cancelled
    }

    async fn billing_failed(&mut self, error: &BillingError) -> Outcome {
        if error.is_insufficient_credits() {
            self.meter.cancel_timer();
            tracing::info!(
                session_id = %self.meter.session().session_id,
                user_id = %self.meter.session().user_id,
                "credits exhausted mid-stream"
            );
            self.emit(Frame::error(error.error_code())).await;
            return Outcome::InsufficientCredits;
        }

        tracing::error!(session_id = %self.meter.session().session_id, error = %error, "background flush failed");
        self.emit(Frame::error(error.error_code())).await;

        if let Err(e) = self.finalize().await {
            tracing::error!(session_id = %self.meter.session().session_id, error = %e, "stream reconciliation failed");
        }

        Outcome::BillingFailed
    }

    async fn upstream_failed(&mut self, error: &LlmError) -> Outcome {
        tracing::warn!(
            session_id = %self.meter.session().session_id,
            model = %self.meter.session().model,
            error = %error,
            "upstream provider failed"
        );
        self.emit(Frame::error(error.error_code())).await;

        // Text already delivered is still owed
        if self.meter.text().is_empty() {
            self.meter.cancel_timer();
        } else if let Err(e) = self.finalize().await {
            tracing::error!(session_id = %self.meter.session().session_id, error = %e, "stream reconciliation failed");
        }

        Outcome::UpstreamError
    }

    async fn finalize(&self) -> Result<FinalUsage, BillingError> {
        let mut attempt = 1;

        loop {
            match self.meter.finalize().await {
                Ok(usage) => return Ok(usage),
                Err(e) if e.is_insufficient_credits() || attempt >= FINALIZE_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.meter.session().session_id,
                        attempt,
                        error = %e,
                        "retrying stream reconciliation"
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Send a frame; false when the client has gone away
    async fn emit(&self, frame: Frame) -> bool {
        self.frames.send(frame).await.is_ok()
    }
}
