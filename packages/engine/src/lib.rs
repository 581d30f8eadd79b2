//! IOSP Engine: command dispatch pipeline and the execution context that
//! composes dispatched requests into one unit of work.

pub mod config;
pub mod context;
pub mod dispatch;

pub use config::EngineConfig;
pub use context::{BlockOptions, ExecutionContext, ExecutionError, ResponseCache};
pub use dispatch::{
    build_dispatch_pipeline, CacheableRequest, CacheableRequests, Command, CommandContext,
    CommandRouter, DispatchError, Dispatcher, RequestHandler,
};
