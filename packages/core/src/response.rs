//! Response shapes returned by request handlers.
//!
//! Three shapes exist: the payload-free [`Response`], the single-payload
//! [`TypedResponse<T>`] and the list-payload [`ListResponse<T>`]. The typed
//! shapes embed a [`Response`] as their `status` and expose it through
//! [`ResponseShape::status`].

use serde::{Deserialize, Serialize};

use crate::result::ResultCode;

/// Outcome metadata shared by every response shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub result_code: ResultCode,
    pub message: Option<String>,
    /// Free-form diagnostic tag. The execution context stores the name of the
    /// block that produced or aborted a run here.
    pub info: Option<String>,
    pub count: usize,
    /// Cooperative stop signal: a run aborts on an interrupted response even
    /// when the block tolerates errors.
    pub interrupt: bool,
}

impl Response {
    #[must_use]
    pub fn new(result_code: ResultCode) -> Self {
        Self {
            result_code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn success() -> Self {
        Self::new(ResultCode::Success)
    }

    #[must_use]
    pub fn failure(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self::new(result_code).with_message(message)
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Marks the response as an interrupt.
    #[must_use]
    pub fn interrupted(mut self) -> Self {
        self.interrupt = true;
        self
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result_code.succeeded()
    }
}

/// Response carrying at most one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedResponse<T> {
    #[serde(flatten)]
    pub status: Response,
    pub data: Option<T>,
}

impl<T> TypedResponse<T> {
    /// Builds a response whose `count` is 1 when `data` is present, 0 otherwise.
    #[must_use]
    pub fn new(result_code: ResultCode, data: Option<T>) -> Self {
        let count = usize::from(data.is_some());
        Self {
            status: Response::new(result_code).with_count(count),
            data,
        }
    }

    #[must_use]
    pub fn success(data: T) -> Self {
        Self::new(ResultCode::Success, Some(data))
    }

    #[must_use]
    pub fn failure(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self::from_status(Response::failure(result_code, message))
    }

    /// Wraps existing metadata without a payload.
    #[must_use]
    pub fn from_status(status: Response) -> Self {
        Self { status, data: None }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.status.info = Some(info.into());
        self
    }

    #[must_use]
    pub fn interrupted(mut self) -> Self {
        self.status.interrupt = true;
        self
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.succeeded()
    }
}

/// Response carrying a sequence of payloads.
///
/// `status.count` holds the total number of items available, which may
/// exceed `data.len()` for paged results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(flatten)]
    pub status: Response,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    /// Builds a response whose `count` equals `data.len()`.
    #[must_use]
    pub fn new(result_code: ResultCode, data: Vec<T>) -> Self {
        Self {
            status: Response::new(result_code).with_count(data.len()),
            data,
        }
    }

    #[must_use]
    pub fn success(data: Vec<T>) -> Self {
        Self::new(ResultCode::Success, data)
    }

    #[must_use]
    pub fn failure(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self::from_status(Response::failure(result_code, message))
    }

    #[must_use]
    pub fn from_status(status: Response) -> Self {
        Self {
            status,
            data: Vec::new(),
        }
    }

    /// Overrides `count` with the total number of items available upstream.
    #[must_use]
    pub fn with_total(mut self, total: usize) -> Self {
        self.status.count = total;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn interrupted(mut self) -> Self {
        self.status.interrupt = true;
        self
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.succeeded()
    }
}
