//! Execution context: an ordered list of blocks folded into one outcome.
//!
//! Callers chain `with_*` builders to append blocks, then call one terminal
//! operation ([`ExecutionContext::execute`], [`ExecutionContext::execute_list`]
//! or [`ExecutionContext::execute_plain`]). A run walks the blocks once,
//! dispatching each block (or each concurrency group as a whole) through a
//! [`Dispatcher`], caching the responses of named blocks and stopping at the
//! first unrecoverable failure or interrupt.
//!
//! Failures reported by handlers become the run's response. Faults (the
//! dispatcher returned no response at all) surface as [`ExecutionError`].

pub mod block;
pub mod cache;
mod group;

use std::any::Any;
use std::collections::HashSet;

use iosp_core::{
    AnyRequest, AnyResponse, ListResponse, PlainRequest, Request, Response, ResultCode,
    TypedResponse,
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

pub use block::{AfterCheck, BeforeCheck, BlockOptions, GroupId};
pub use cache::ResponseCache;

use block::{BatchFactory, BlockKind, ExecutionBlock, SingleFactory};

use crate::dispatch::{Command, DispatchError, Dispatcher};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults that end a run without a response.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("block {block} could not be dispatched: {source}")]
    Dispatch {
        block: String,
        #[source]
        source: DispatchError,
    },
    #[error("group member of block {block} panicked: {source}")]
    MemberPanicked {
        block: String,
        #[source]
        source: JoinError,
    },
}

fn rejection_message(name: &str) -> String {
    format!("Pre/Post condition fails in: {name}")
}

// ---------------------------------------------------------------------------
// Command ids
// ---------------------------------------------------------------------------

/// Builds the commands of one run: sequential call ids, the run's
/// cancellation token and the issuing block's name.
struct CommandIds<'a> {
    cancel: &'a CancellationToken,
    next: u64,
}

impl<'a> CommandIds<'a> {
    fn new(cancel: &'a CancellationToken) -> Self {
        Self { cancel, next: 0 }
    }

    fn command(&mut self, request: AnyRequest, block: &ExecutionBlock) -> Command {
        self.next += 1;
        Command::new(self.next, request, self.cancel.clone()).with_block_name(block.name())
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

enum RunOutcome {
    /// Every block ran; holds the result of the last one.
    Completed(Option<AnyResponse>),
    Aborted(Response),
}

/// An ordered pipeline of request blocks plus the cache of their named results.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    blocks: Vec<ExecutionBlock>,
    cache: ResponseCache,
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block that dispatches the request built by `factory`.
    ///
    /// The response shape of the block is `R::Response`.
    #[must_use]
    pub fn with_request<R, F>(mut self, factory: F, options: impl Into<BlockOptions>) -> Self
    where
        R: Request,
        F: Fn(&ResponseCache) -> R + Send + Sync + 'static,
    {
        let factory: SingleFactory =
            Box::new(move |cache: &ResponseCache| AnyRequest::new(factory(cache)));
        self.push(BlockKind::Single(factory), options.into());
        self
    }

    /// Appends a block that dispatches a list of requests one after another.
    ///
    /// The block fails on the first unsuccessful request and succeeds with an
    /// empty `Response` otherwise. After checks are not applied.
    #[must_use]
    pub fn with_requests<F>(mut self, factory: F, options: impl Into<BlockOptions>) -> Self
    where
        F: Fn(&ResponseCache) -> Vec<PlainRequest> + Send + Sync + 'static,
    {
        let factory: BatchFactory = Box::new(factory);
        self.push(BlockKind::Batch(factory), options.into());
        self
    }

    /// Appends one block per factory, all dispatched concurrently as a single
    /// step. Every member shares `options`.
    #[must_use]
    pub fn with_parallel_when_all_requests<R, F, I>(
        mut self,
        factories: I,
        options: impl Into<BlockOptions>,
    ) -> Self
    where
        R: Request,
        F: Fn(&ResponseCache) -> R + Send + Sync + 'static,
        I: IntoIterator<Item = F>,
    {
        let group = GroupId::new();
        let options = options.into();
        for factory in factories {
            let factory: SingleFactory =
                Box::new(move |cache: &ResponseCache| AnyRequest::new(factory(cache)));
            self.push(BlockKind::Grouped { group, factory }, options.clone());
        }
        self
    }

    fn push(&mut self, kind: BlockKind, options: BlockOptions) {
        let index = self.blocks.len();
        self.blocks.push(ExecutionBlock {
            index,
            kind,
            options,
        });
    }

    /// Runs the pipeline and returns the last block's single payload as `T`.
    ///
    /// A list block in last position converts when `T` is `Vec<X>`; a
    /// concurrency group never does (see [`execute_list`](Self::execute_list)).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when a command faults.
    pub async fn execute<T>(
        &mut self,
        dispatcher: &(impl Dispatcher + ?Sized),
        cancel: &CancellationToken,
    ) -> Result<TypedResponse<T>, ExecutionError>
    where
        T: Any + Send + Sync + Clone,
    {
        Ok(match self.run(dispatcher, cancel).await? {
            RunOutcome::Aborted(status) => TypedResponse::from_status(status),
            RunOutcome::Completed(last) => {
                let info = last.as_ref().and_then(|r| r.info().map(str::to_owned));
                let data = last.and_then(AnyResponse::into_data::<T>);
                let mut resp = TypedResponse::new(ResultCode::Success, data);
                resp.status.info = info;
                resp
            }
        })
    }

    /// Runs the pipeline and returns the last block's list payload as `T`
    /// items. A concurrency group in last position yields its members'
    /// payloads in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when a command faults.
    pub async fn execute_list<T>(
        &mut self,
        dispatcher: &(impl Dispatcher + ?Sized),
        cancel: &CancellationToken,
    ) -> Result<ListResponse<T>, ExecutionError>
    where
        T: Any + Send + Sync + Clone,
    {
        Ok(match self.run(dispatcher, cancel).await? {
            RunOutcome::Aborted(status) => ListResponse::from_status(status),
            RunOutcome::Completed(None) => ListResponse::success(Vec::new()),
            RunOutcome::Completed(Some(last)) => {
                let message = last.message().map(str::to_owned);
                let count = last.count();
                let mut resp = ListResponse::success(last.into_list::<T>().unwrap_or_default());
                resp.status.message = message;
                resp.status.count = count;
                resp
            }
        })
    }

    /// Runs the pipeline for its effects only.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when a command faults.
    pub async fn execute_plain(
        &mut self,
        dispatcher: &(impl Dispatcher + ?Sized),
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        Ok(match self.run(dispatcher, cancel).await? {
            RunOutcome::Aborted(status) => status,
            RunOutcome::Completed(last) => {
                let mut resp = Response::success();
                if let Some(last) = last {
                    resp.message = last.message().map(str::to_owned);
                    resp.count = last.count();
                }
                resp
            }
        })
    }

    /// Single payload cached under `name` by the last run.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<std::sync::Arc<T>> {
        self.cache.get(name)
    }

    #[must_use]
    pub fn get_list<T: Any + Send + Sync>(&self, name: &str) -> Option<std::sync::Arc<Vec<T>>> {
        self.cache.get_list(name)
    }

    #[must_use]
    pub fn get_parallel_result_by_index<T: Any + Send + Sync>(
        &self,
        name: &str,
        index: usize,
    ) -> Option<std::sync::Arc<T>> {
        self.cache.get_parallel_result_by_index(name, index)
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    async fn run<D>(
        &mut self,
        dispatcher: &D,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError>
    where
        D: Dispatcher + ?Sized,
    {
        let span = info_span!("execution_context", blocks = self.blocks.len());
        self.fold(dispatcher, cancel).instrument(span).await
    }

    async fn fold<D>(
        &mut self,
        dispatcher: &D,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError>
    where
        D: Dispatcher + ?Sized,
    {
        self.cache = ResponseCache::default();
        let mut ids = CommandIds::new(cancel);
        let mut processed_groups = HashSet::new();
        let mut last = None;

        for block in &self.blocks {
            let step = match &block.kind {
                BlockKind::Grouped { group, .. } => {
                    if !processed_groups.insert(*group) {
                        continue;
                    }
                    let aggregate =
                        group::dispatch_group(&self.blocks, *group, &self.cache, dispatcher, &mut ids)
                            .await?;
                    Some(aggregate)
                }
                BlockKind::Single(factory) => {
                    dispatch_single(block, factory, &self.cache, dispatcher, &mut ids).await?
                }
                BlockKind::Batch(factory) => {
                    dispatch_batch(block, factory, &self.cache, dispatcher, &mut ids).await?
                }
            };

            match step {
                None if !block.continue_on_error() => {
                    warn!(block = %block.label(), "run aborted by rejected block");
                    let name = block.name();
                    let mut status = Response::failure(
                        ResultCode::FailureBadRequest,
                        rejection_message(name.unwrap_or("")),
                    );
                    status.info = name.map(str::to_owned);
                    return Ok(RunOutcome::Aborted(status));
                }
                None => {
                    debug!(block = %block.label(), "rejected block skipped");
                    last = None;
                }
                Some(resp)
                    if resp.interrupt() || (!resp.succeeded() && !block.continue_on_error()) =>
                {
                    warn!(
                        block = %block.label(),
                        result = %resp.result_code(),
                        interrupt = resp.interrupt(),
                        "run aborted"
                    );
                    let interrupted = resp.interrupt();
                    let mut status = resp.into_status();
                    if !interrupted {
                        status.count = 0;
                    }
                    status.info = block.name().map(str::to_owned);
                    return Ok(RunOutcome::Aborted(status));
                }
                Some(resp) => {
                    if !resp.succeeded() {
                        debug!(
                            block = %block.label(),
                            result = %resp.result_code(),
                            "failed block tolerated"
                        );
                    }
                    self.cache.add(block.name(), &resp);
                    last = Some(resp);
                }
            }
        }

        debug!(cached = self.cache.len(), "run complete");
        Ok(RunOutcome::Completed(last))
    }
}

/// Dispatches a single-request block. `None` means the block was rejected.
async fn dispatch_single<D>(
    block: &ExecutionBlock,
    factory: &SingleFactory,
    cache: &ResponseCache,
    dispatcher: &D,
    ids: &mut CommandIds<'_>,
) -> Result<Option<AnyResponse>, ExecutionError>
where
    D: Dispatcher + ?Sized,
{
    if !block.passes_before_check(cache) {
        return Ok(None);
    }
    let command = ids.command(factory(cache), block);
    let response = dispatcher
        .dispatch(command)
        .await
        .map_err(|source| ExecutionError::Dispatch {
            block: block.label(),
            source,
        })?;
    Ok(block.passes_after_check(&response).then_some(response))
}

/// Dispatches a batch block's requests in order, stopping at the first
/// unsuccessful one.
async fn dispatch_batch<D>(
    block: &ExecutionBlock,
    factory: &BatchFactory,
    cache: &ResponseCache,
    dispatcher: &D,
    ids: &mut CommandIds<'_>,
) -> Result<Option<AnyResponse>, ExecutionError>
where
    D: Dispatcher + ?Sized,
{
    if !block.passes_before_check(cache) {
        return Ok(None);
    }
    for request in factory(cache) {
        let command = ids.command(request.into_inner(), block);
        let response = dispatcher
            .dispatch(command)
            .await
            .map_err(|source| ExecutionError::Dispatch {
                block: block.label(),
                source,
            })?;
        if !response.succeeded() {
            let mut status = Response::new(ResultCode::FailureBadRequest);
            status.message = response.message().map(str::to_owned);
            return Ok(Some(status.into()));
        }
    }
    Ok(Some(Response::success().into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
