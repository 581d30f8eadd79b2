//! Command dispatch: the request envelope, the type-routed handler table and
//! the middleware pipeline in front of it.

pub mod command;
pub mod middleware;
pub mod router;

pub use command::{Command, CommandContext, DispatchError, DispatchFuture, Dispatcher};
pub use middleware::{build_dispatch_pipeline, CacheableRequest, CacheableRequests, CachingLayer};
pub use router::{CommandRouter, HandlerFn, RequestHandler};
