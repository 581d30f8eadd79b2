//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`cancel`]: Aborts commands whose cancellation token fired
//! - [`logging`]: Command timing and outcome via `tracing` spans
//! - [`caching`]: Sliding-expiration response cache for cacheable requests
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod caching;
pub mod cancel;
pub mod logging;
pub mod pipeline;

pub use caching::{CacheableRequest, CacheableRequests, CachingLayer};
pub use cancel::CancelLayer;
pub use logging::LoggingLayer;
pub use pipeline::build_dispatch_pipeline;
