//! Cancellation middleware for commands.
//!
//! Races each command against its `ctx.cancel` token. A command whose token is
//! already cancelled never reaches the inner service.

use std::task::{Context, Poll};

use iosp_core::AnyResponse;
use tower::{Layer, Service};

use crate::dispatch::command::{Command, DispatchError, DispatchFuture};

/// Tower layer that aborts commands once their cancellation token fires.
#[derive(Debug, Clone)]
pub struct CancelLayer;

impl<S> Layer<S> for CancelLayer {
    type Service = CancelService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CancelService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct CancelService<S> {
    inner: S,
}

impl<S> Service<Command> for CancelService<S>
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
        let cancel = cmd.ctx.cancel.clone();
        let request = cmd.ctx.request_name.clone();
        if cancel.is_cancelled() {
            return Box::pin(async move { Err(DispatchError::Cancelled { request }) });
        }

        let fut = self.inner.call(cmd);
        Box::pin(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(DispatchError::Cancelled { request }),
                result = fut => result,
            }
        })
    }
}
