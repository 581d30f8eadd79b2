//! Command envelope, dispatch errors and the dispatcher seam.

use std::future::Future;
use std::pin::Pin;

use iosp_core::{AnyRequest, AnyResponse};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};

/// Context carried with every command through the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub call_id: u64,
    /// Short type name of the request, used for logging.
    pub request_name: String,
    /// Name of the execution block that issued the command, if any.
    pub block_name: Option<String>,
    pub cancel: CancellationToken,
}

impl CommandContext {
    #[must_use]
    pub fn new(call_id: u64, request_name: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            call_id,
            request_name: request_name.into(),
            block_name: None,
            cancel,
        }
    }
}

/// A request on its way to a handler.
#[derive(Debug)]
pub struct Command {
    pub ctx: CommandContext,
    pub request: AnyRequest,
}

impl Command {
    #[must_use]
    pub fn new(call_id: u64, request: AnyRequest, cancel: CancellationToken) -> Self {
        let ctx = CommandContext::new(call_id, request.short_name(), cancel);
        Self { ctx, request }
    }

    #[must_use]
    pub fn ctx(&self) -> &CommandContext {
        &self.ctx
    }

    #[must_use]
    pub fn with_block_name(mut self, block_name: Option<&str>) -> Self {
        self.ctx.block_name = block_name.map(str::to_owned);
        self
    }
}

/// Faults raised while dispatching a command.
///
/// A fault is not a failed response: handlers report business failures as a
/// response with a failure [`ResultCode`](iosp_core::ResultCode). These
/// variants mean no response exists at all.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for request: {request}")]
    UnknownHandler { request: String },
    #[error("command {request} cancelled")]
    Cancelled { request: String },
    #[error("handler received a request of the wrong type: {request}")]
    WrongRequest { request: &'static str },
    #[error("handler error: {0}")]
    Handler(#[from] anyhow::Error),
}

/// Boxed future returned by every dispatcher and middleware service.
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<AnyResponse, DispatchError>> + Send>>;

/// Executes one command and yields its response.
///
/// The returned future is `'static` so concurrency groups can spawn it as an
/// independent task. Any cloneable `tower::Service<Command>` with matching
/// response and error types is a dispatcher.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, command: Command) -> DispatchFuture;
}

impl<S> Dispatcher for S
where
    S: Service<Command, Response = AnyResponse, Error = DispatchError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    fn dispatch(&self, command: Command) -> DispatchFuture {
        Box::pin(self.clone().oneshot(command))
    }
}
