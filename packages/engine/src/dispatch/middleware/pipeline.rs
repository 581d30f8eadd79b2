//! Pipeline composition: combines all middleware layers into a single service stack.

use iosp_core::AnyResponse;
use tower::{Service, ServiceBuilder};

use super::caching::CachingLayer;
use super::cancel::CancelLayer;
use super::logging::LoggingLayer;
use crate::config::EngineConfig;
use crate::dispatch::command::{Command, DispatchError, DispatchFuture};
use crate::dispatch::router::CommandRouter;

/// Build the dispatch pipeline by wrapping the `CommandRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `CancelLayer` -- stop commands whose run was cancelled
/// 2. `LoggingLayer` -- record timing and outcome, cache hits included
/// 3. `CachingLayer` -- serve the router's cacheable requests from the cache
///
/// The returned service is cloneable and therefore usable as a
/// [`Dispatcher`](crate::dispatch::Dispatcher).
#[must_use]
pub fn build_dispatch_pipeline(
    router: CommandRouter,
    config: &EngineConfig,
) -> impl Service<Command, Response = AnyResponse, Error = DispatchError, Future = DispatchFuture>
       + Clone
       + Send
       + Sync
       + 'static {
    let caching = CachingLayer::new(
        config.response_cache_capacity,
        router.cacheable_requests().clone(),
    );
    ServiceBuilder::new()
        .layer(CancelLayer)
        .layer(LoggingLayer)
        .layer(caching)
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use iosp_core::{AnyRequest, Request, TypedResponse};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::middleware::CacheableRequest;
    use crate::dispatch::Dispatcher;

    struct Square(u64);

    impl Request for Square {
        type Response = TypedResponse<u64>;
    }

    /// Cacheable request answered with a fresh sequence number per dispatch.
    struct Ticket;

    impl Request for Ticket {
        type Response = TypedResponse<u64>;
    }

    impl CacheableRequest for Ticket {
        fn cache_key(&self) -> String {
            "ticket".to_string()
        }
    }

    fn make_router() -> CommandRouter {
        let issued = Arc::new(AtomicU64::new(0));
        let mut router = CommandRouter::new();
        router.register_fn(|req: Square| async move { Ok(TypedResponse::success(req.0 * req.0)) });
        router.register_cached_fn(move |_: Ticket| {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(TypedResponse::success(n)) }
        });
        router
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let svc = build_dispatch_pipeline(make_router(), &EngineConfig::default());
        let cmd = Command::new(42, AnyRequest::new(Square(7)), CancellationToken::new());
        let resp = svc.oneshot(cmd).await.unwrap();
        assert_eq!(resp.data::<u64>().as_deref(), Some(&49));
    }

    #[tokio::test]
    async fn pipeline_serves_cacheable_requests_from_cache() {
        let svc = build_dispatch_pipeline(make_router(), &EngineConfig::default());
        for call_id in 1..=3 {
            let cmd = Command::new(call_id, AnyRequest::new(Ticket), CancellationToken::new());
            let resp = svc.dispatch(cmd).await.unwrap();
            assert_eq!(resp.data::<u64>().as_deref(), Some(&1));
        }

        let cmd = Command::new(4, AnyRequest::new(Square(3)), CancellationToken::new());
        let resp = svc.dispatch(cmd).await.unwrap();
        assert_eq!(resp.data::<u64>().as_deref(), Some(&9));
    }

    #[tokio::test]
    async fn pipeline_honours_cancellation() {
        let svc = build_dispatch_pipeline(make_router(), &EngineConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let cmd = Command::new(1, AnyRequest::new(Square(2)), token);
        let err = svc.dispatch(cmd).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { .. }));
    }
}
