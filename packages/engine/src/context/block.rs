//! Execution blocks and the options attached to them.

use std::fmt;
use std::sync::Arc;

use iosp_core::{AnyRequest, AnyResponse, PlainRequest};
use uuid::Uuid;

use super::cache::ResponseCache;

/// Gate evaluated against the cache before a block's factory runs.
pub type BeforeCheck = Arc<dyn Fn(&ResponseCache) -> bool + Send + Sync>;

/// Gate evaluated against a block's response after dispatch.
pub type AfterCheck = Arc<dyn Fn(&AnyResponse) -> bool + Send + Sync>;

pub(crate) type SingleFactory = Box<dyn Fn(&ResponseCache) -> AnyRequest + Send + Sync>;
pub(crate) type BatchFactory = Box<dyn Fn(&ResponseCache) -> Vec<PlainRequest> + Send + Sync>;

// ---------------------------------------------------------------------------
// BlockOptions
// ---------------------------------------------------------------------------

/// Name, gates and error tolerance of a block.
///
/// A bare `&str` or `String` converts into options carrying only a name.
#[derive(Clone, Default)]
pub struct BlockOptions {
    pub(crate) name: Option<String>,
    pub(crate) before_check: Option<BeforeCheck>,
    pub(crate) after_check: Option<AfterCheck>,
    pub(crate) continue_on_error: bool,
}

impl BlockOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    /// Names the block. The name keys its cached result and is reported in
    /// the `info` of an aborted run.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skips the block (a rejection) when `check` returns `false`.
    #[must_use]
    pub fn before_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ResponseCache) -> bool + Send + Sync + 'static,
    {
        self.before_check = Some(Arc::new(check));
        self
    }

    /// Discards the block's response (a rejection) when `check` returns `false`.
    #[must_use]
    pub fn after_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&AnyResponse) -> bool + Send + Sync + 'static,
    {
        self.after_check = Some(Arc::new(check));
        self
    }

    /// Lets the run proceed past a rejection or a failed response.
    /// Interrupts still abort.
    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

impl From<&str> for BlockOptions {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for BlockOptions {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl fmt::Debug for BlockOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockOptions")
            .field("name", &self.name)
            .field("before_check", &self.before_check.is_some())
            .field("after_check", &self.after_check.is_some())
            .field("continue_on_error", &self.continue_on_error)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ExecutionBlock
// ---------------------------------------------------------------------------

/// Identifier shared by the blocks of one concurrency group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(Uuid);

impl GroupId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub(crate) enum BlockKind {
    Single(SingleFactory),
    Batch(BatchFactory),
    Grouped { group: GroupId, factory: SingleFactory },
}

/// One scheduled step of a run.
pub(crate) struct ExecutionBlock {
    pub(crate) index: usize,
    pub(crate) kind: BlockKind,
    pub(crate) options: BlockOptions,
}

impl ExecutionBlock {
    pub(crate) fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    /// Name used in messages and logs: the block name, or `#<position>` for
    /// unnamed blocks.
    pub(crate) fn label(&self) -> String {
        match self.name() {
            Some(name) => name.to_owned(),
            None => format!("#{}", self.index),
        }
    }

    pub(crate) fn continue_on_error(&self) -> bool {
        self.options.continue_on_error
    }

    pub(crate) fn passes_before_check(&self, cache: &ResponseCache) -> bool {
        self.options.before_check.as_ref().is_none_or(|check| check(cache))
    }

    pub(crate) fn passes_after_check(&self, response: &AnyResponse) -> bool {
        self.options.after_check.as_ref().is_none_or(|check| check(response))
    }
}

impl fmt::Debug for ExecutionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            BlockKind::Single(_) => "single".to_owned(),
            BlockKind::Batch(_) => "batch".to_owned(),
            BlockKind::Grouped { group, .. } => format!("group {group}"),
        };
        f.debug_struct("ExecutionBlock")
            .field("index", &self.index)
            .field("kind", &kind)
            .field("options", &self.options)
            .finish()
    }
}
