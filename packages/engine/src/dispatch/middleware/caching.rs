//! Response caching middleware for commands.
//!
//! Requests opt in by implementing [`CacheableRequest`] and being registered
//! in a [`CacheableRequests`] table. Successful responses are stored under the
//! request's cache key with a sliding expiration: every hit pushes the
//! deadline out by the request's cache duration again.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use iosp_core::{AnyRequest, AnyResponse, Request};
use quick_cache::sync::Cache;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

use crate::dispatch::command::{Command, DispatchError, DispatchFuture};

// ---------------------------------------------------------------------------
// CacheableRequest
// ---------------------------------------------------------------------------

/// A request whose response may be served from the response cache.
pub trait CacheableRequest: Request {
    /// Key the response is stored under. Requests sharing a key share the
    /// cached response.
    fn cache_key(&self) -> String;

    /// Sliding expiration. `None` keeps the entry until it is evicted.
    fn cache_duration(&self) -> Option<Duration> {
        None
    }

    /// When `true` the cache is neither read nor written for this request.
    fn bypass_cache(&self) -> bool {
        false
    }
}

/// Cache settings read from one erased request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheDirective {
    key: String,
    duration: Option<Duration>,
    bypass: bool,
}

type DirectiveFn = fn(&AnyRequest) -> Option<CacheDirective>;

fn directive_of<R: CacheableRequest>(request: &AnyRequest) -> Option<CacheDirective> {
    request.downcast_ref::<R>().map(|r| CacheDirective {
        key: r.cache_key(),
        duration: r.cache_duration(),
        bypass: r.bypass_cache(),
    })
}

/// Request types that take part in response caching.
///
/// Cloning is cheap and shares the table.
#[derive(Clone, Default)]
pub struct CacheableRequests {
    by_type: Arc<HashMap<TypeId, DirectiveFn>>,
}

impl CacheableRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `R` as cacheable.
    pub fn register<R: CacheableRequest>(&mut self) {
        Arc::make_mut(&mut self.by_type).insert(TypeId::of::<R>(), directive_of::<R>);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<R: CacheableRequest>(mut self) -> Self {
        self.register::<R>();
        self
    }

    #[must_use]
    pub fn contains<R: CacheableRequest>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<R>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    fn directive(&self, request: &AnyRequest) -> Option<CacheDirective> {
        self.by_type
            .get(&request.request_type())
            .and_then(|directive| directive(request))
    }
}

impl std::fmt::Debug for CacheableRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheableRequests")
            .field("types", &self.by_type.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CachingLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CachedResponse {
    response: AnyResponse,
    sliding: Option<Duration>,
    expires_at: Option<Instant>,
}

impl CachedResponse {
    fn new(response: AnyResponse, sliding: Option<Duration>) -> Self {
        Self {
            response,
            sliding,
            expires_at: sliding.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

type ResponseStore = Arc<Cache<String, CachedResponse>>;

/// Tower layer that serves cacheable requests from a shared response store.
///
/// Clones of the wrapped service share one store, bounded to `capacity`
/// entries.
#[derive(Clone)]
pub struct CachingLayer {
    store: ResponseStore,
    cacheable: CacheableRequests,
}

impl CachingLayer {
    #[must_use]
    pub fn new(capacity: usize, cacheable: CacheableRequests) -> Self {
        Self {
            store: Arc::new(Cache::new(capacity.max(1))),
            cacheable,
        }
    }

    /// Number of stored responses, expired ones included until next read.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.store.len()
    }
}

impl std::fmt::Debug for CachingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingLayer")
            .field("cached", &self.store.len())
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

impl<S> Layer<S> for CachingLayer {
    type Service = CachingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CachingService {
            inner,
            store: Arc::clone(&self.store),
            cacheable: self.cacheable.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// CachingService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CachingService<S> {
    inner: S,
    store: ResponseStore,
    cacheable: CacheableRequests,
}

impl<S> CachingService<S> {
    /// Returns the live entry under `key`, sliding its deadline forward.
    fn lookup(&self, key: &str) -> Option<AnyResponse> {
        let entry = self.store.get(key)?;
        let now = Instant::now();
        if entry.is_expired(now) {
            self.store.remove(key);
            return None;
        }
        if let Some(sliding) = entry.sliding {
            let refreshed = CachedResponse {
                expires_at: Some(now + sliding),
                ..entry.clone()
            };
            self.store.insert(key.to_owned(), refreshed);
        }
        Some(entry.response)
    }
}

impl<S> Service<Command> for CachingService<S>
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
        let Some(directive) = self.cacheable.directive(&cmd.request) else {
            return Box::pin(self.inner.call(cmd));
        };
        if directive.bypass {
            debug!(key = %directive.key, "cache bypassed");
            return Box::pin(self.inner.call(cmd));
        }

        if let Some(response) = self.lookup(&directive.key) {
            debug!(key = %directive.key, request = %cmd.ctx.request_name, "fetched from cache");
            return Box::pin(async move { Ok(response) });
        }

        let store = Arc::clone(&self.store);
        let fut = self.inner.call(cmd);
        Box::pin(async move {
            let response = fut.await?;
            if response.succeeded() {
                let CacheDirective { key, duration, .. } = directive;
                debug!(key = %key, "added to cache");
                store.insert(key, CachedResponse::new(response.clone(), duration));
            }
            Ok(response)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
