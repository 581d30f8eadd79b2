//! Logging middleware for commands.
//!
//! Records request name, call id, duration and outcome for every command on a
//! `tracing` span and emits one "command complete" event per call.

use std::task::{Context, Poll};
use std::time::Instant;

use iosp_core::AnyResponse;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::command::{Command, DispatchError, DispatchFuture};

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments commands with timing and outcome via `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

/// Service wrapper that records command duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S> Service<Command> for LoggingService<S>
where
    S: Service<Command, Response = AnyResponse, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = AnyResponse;
    type Error = DispatchError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, cmd: Command) -> Self::Future {
        let request = cmd.ctx.request_name.clone();
        let call_id = cmd.ctx.call_id;

        let span = info_span!(
            "command",
            request = %request,
            call_id = call_id,
            block = cmd.ctx.block_name.as_deref().unwrap_or(""),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(cmd);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;

                let outcome = match &result {
                    Ok(resp) if resp.succeeded() => "ok",
                    Ok(_) => "failed",
                    Err(_) => "error",
                };

                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(
                    request = %request,
                    call_id = call_id,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "command complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
