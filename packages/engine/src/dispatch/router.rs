//! Command routing: dispatches a `Command` to the handler registered for its
//! request type.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use iosp_core::{AnyResponse, Request, ResponseShape};
use tower::Service;

use super::command::{Command, CommandContext, DispatchError, DispatchFuture};
use super::middleware::caching::{CacheableRequest, CacheableRequests};

// ---------------------------------------------------------------------------
// RequestHandler trait
// ---------------------------------------------------------------------------

/// Handles one request type.
///
/// Business failures belong in the returned response's result code. An `Err`
/// is a fault and surfaces as [`DispatchError::Handler`].
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: R, ctx: &CommandContext) -> anyhow::Result<R::Response>;
}

/// Adapts an async closure `Fn(R) -> Future<Output = anyhow::Result<R::Response>>`
/// into a [`RequestHandler`].
pub struct HandlerFn<F, R> {
    f: F,
    _request: PhantomData<fn(R)>,
}

impl<F, R> HandlerFn<F, R> {
    #[must_use]
    pub fn new(f: F) -> Self {
        Self {
            f,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R, F, Fut> RequestHandler<R> for HandlerFn<F, R>
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
{
    async fn handle(&self, request: R, _ctx: &CommandContext) -> anyhow::Result<R::Response> {
        (self.f)(request).await
    }
}

// ---------------------------------------------------------------------------
// CommandRouter
// ---------------------------------------------------------------------------

/// A type-erased handler: takes the whole command, returns the erased response.
type ErasedHandler = Arc<dyn Fn(Command) -> DispatchFuture + Send + Sync>;

/// Routes `Command` values to the handler registered for the request's type.
///
/// Cloning is cheap and shares the handler table, so a router can be handed
/// to concurrent tasks. Commands whose request type has no handler return
/// `DispatchError::UnknownHandler`.
///
/// The router also records which request types opted into response caching;
/// [`build_dispatch_pipeline`](super::build_dispatch_pipeline) hands that
/// table to the caching layer.
#[derive(Clone, Default)]
pub struct CommandRouter {
    handlers: Arc<HashMap<TypeId, ErasedHandler>>,
    cacheable: CacheableRequests,
}

impl CommandRouter {
    /// Create a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for request type `R`, replacing any previous one.
    pub fn register<R, H>(&mut self, handler: H)
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |cmd: Command| -> DispatchFuture {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let Command { ctx, request } = cmd;
                let request = request
                    .downcast::<R>()
                    .map_err(|other| DispatchError::WrongRequest {
                        request: other.type_name(),
                    })?;
                let response = handler.handle(request, &ctx).await?;
                Ok::<AnyResponse, DispatchError>(response.into_any())
            })
        });
        Arc::make_mut(&mut self.handlers).insert(TypeId::of::<R>(), erased);
    }

    /// Register an async closure as the handler for `R`.
    pub fn register_fn<R, F, Fut>(&mut self, f: F)
    where
        R: Request,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
    {
        self.register::<R, _>(HandlerFn::new(f));
    }

    /// Register the handler for a cacheable request type `R`.
    pub fn register_cached<R, H>(&mut self, handler: H)
    where
        R: CacheableRequest,
        H: RequestHandler<R>,
    {
        self.register::<R, H>(handler);
        self.cacheable.register::<R>();
    }

    /// Register an async closure as the handler for a cacheable `R`.
    pub fn register_cached_fn<R, F, Fut>(&mut self, f: F)
    where
        R: CacheableRequest,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
    {
        self.register_cached::<R, _>(HandlerFn::new(f));
    }

    /// Request types registered through `register_cached*`.
    #[must_use]
    pub fn cacheable_requests(&self) -> &CacheableRequests {
        &self.cacheable
    }

    /// Returns `true` if a handler is registered for `R`.
    #[must_use]
    pub fn handles<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Service<Command> for CommandRouter {
    type Response = AnyResponse;
    type Error = DispatchError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Handlers are plain async functions with no readiness of their own.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, cmd: Command) -> Self::Future {
        match self.handlers.get(&cmd.request.request_type()) {
            Some(handler) => handler(cmd),
            None => {
                let request = cmd.ctx.request_name;
                Box::pin(async move { Err(DispatchError::UnknownHandler { request }) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use iosp_core::{AnyRequest, ListResponse, Response, ResultCode, TypedResponse};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;

    struct GetName {
        id: u32,
    }

    impl Request for GetName {
        type Response = TypedResponse<String>;
    }

    struct ListNames;

    impl Request for ListNames {
        type Response = ListResponse<String>;
    }

    struct Audit;

    impl Request for Audit {
        type Response = Response;
    }

    /// Handler that echoes the block name it was called from.
    struct BlockEcho;

    #[async_trait]
    impl RequestHandler<Audit> for BlockEcho {
        async fn handle(&self, _request: Audit, ctx: &CommandContext) -> anyhow::Result<Response> {
            let block = ctx.block_name.clone().unwrap_or_default();
            Ok(Response::success().with_message(block))
        }
    }

    fn make_cmd(request: AnyRequest) -> Command {
        Command::new(1, request, CancellationToken::new())
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let mut router = CommandRouter::new();
        router.register_fn(|req: GetName| async move {
            Ok(TypedResponse::success(format!("user-{}", req.id)))
        });

        let resp = router
            .oneshot(make_cmd(AnyRequest::new(GetName { id: 3 })))
            .await
            .unwrap();
        assert_eq!(resp.data_ref::<String>().map(String::as_str), Some("user-3"));
    }

    #[tokio::test]
    async fn unknown_request_returns_error() {
        let mut router = CommandRouter::new();
        router.register_fn(|_: ListNames| async { Ok(ListResponse::success(Vec::<String>::new())) });

        let err = router
            .oneshot(make_cmd(AnyRequest::new(GetName { id: 1 })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnknownHandler { request } if request == "GetName"
        ));
    }

    #[tokio::test]
    async fn routes_to_correct_handler_among_multiple() {
        let mut router = CommandRouter::new();
        router.register_fn(|req: GetName| async move {
            Ok(TypedResponse::success(format!("user-{}", req.id)))
        });
        router.register_fn(|_: ListNames| async {
            Ok(ListResponse::success(vec!["a".to_string(), "b".to_string()]).with_total(40))
        });
        router.register::<Audit, _>(BlockEcho);
        assert_eq!(router.len(), 3);
        assert!(router.handles::<Audit>());

        let resp = ServiceExt::ready(&mut router)
            .await
            .unwrap()
            .call(make_cmd(AnyRequest::new(ListNames)))
            .await
            .unwrap();
        assert_eq!(resp.count(), 40);
        assert_eq!(resp.list_ref::<String>().map(<[String]>::len), Some(2));

        let cmd = make_cmd(AnyRequest::new(Audit)).with_block_name(Some("audit-trail"));
        let resp = ServiceExt::ready(&mut router).await.unwrap().call(cmd).await.unwrap();
        assert_eq!(resp.message(), Some("audit-trail"));
    }

    impl CacheableRequest for GetName {
        fn cache_key(&self) -> String {
            format!("name-{}", self.id)
        }
    }

    #[test]
    fn cached_registration_marks_request_cacheable() {
        let mut router = CommandRouter::new();
        router.register_fn(|_: ListNames| async { Ok(ListResponse::success(Vec::<String>::new())) });
        router.register_cached_fn(|req: GetName| async move {
            Ok(TypedResponse::success(format!("user-{}", req.id)))
        });
        assert!(router.handles::<GetName>());
        assert!(router.cacheable_requests().contains::<GetName>());
        assert_eq!(router.cacheable_requests().len(), 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_dispatch_fault() {
        let mut router = CommandRouter::new();
        router.register_fn(|_: Audit| async { Err::<Response, _>(anyhow::anyhow!("db unreachable")) });

        let err = router.oneshot(make_cmd(AnyRequest::new(Audit))).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
        assert!(err.to_string().contains("db unreachable"));
    }

    #[tokio::test]
    async fn failure_response_is_not_a_fault() {
        let mut router = CommandRouter::new();
        router.register_fn(|req: GetName| async move {
            Ok(TypedResponse::failure(
                ResultCode::FailureNotFound,
                format!("name {} not found", req.id),
            ))
        });

        let resp = router
            .oneshot(make_cmd(AnyRequest::new(GetName { id: 8 })))
            .await
            .unwrap();
        assert_eq!(resp.result_code(), ResultCode::FailureNotFound);
        assert_eq!(resp.message(), Some("name 8 not found"));
    }
}
