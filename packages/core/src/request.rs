//! Requests and their type-erased envelope.

use std::any::{Any, TypeId};
use std::fmt;

use crate::response::Response;
use crate::shape::ResponseShape;

/// A request object routed to exactly one handler.
///
/// The associated `Response` declares which response shape the handler
/// produces.
pub trait Request: Send + 'static {
    type Response: ResponseShape;
}

/// A request with its concrete type erased, ready for dispatch.
pub struct AnyRequest {
    type_id: TypeId,
    type_name: &'static str,
    inner: Box<dyn Any + Send>,
}

impl AnyRequest {
    #[must_use]
    pub fn new<R: Request>(request: R) -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            inner: Box::new(request),
        }
    }

    /// `TypeId` of the wrapped request, used as the routing key.
    #[must_use]
    pub fn request_type(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name of the wrapped request.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without module paths, e.g. `GetById<Customer>`.
    #[must_use]
    pub fn short_name(&self) -> String {
        short_type_name(self.type_name)
    }

    #[must_use]
    pub fn is<R: Request>(&self) -> bool {
        self.type_id == TypeId::of::<R>()
    }

    #[must_use]
    pub fn downcast_ref<R: Request>(&self) -> Option<&R> {
        self.inner.downcast_ref::<R>()
    }

    /// Recovers the concrete request.
    ///
    /// # Errors
    ///
    /// Returns the envelope unchanged when it does not hold an `R`.
    pub fn downcast<R: Request>(self) -> Result<R, Self> {
        if !self.is::<R>() {
            return Err(self);
        }
        let Self {
            type_id,
            type_name,
            inner,
        } = self;
        inner.downcast::<R>().map(|r| *r).map_err(|inner| Self {
            type_id,
            type_name,
            inner,
        })
    }
}

impl fmt::Debug for AnyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyRequest")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A request whose handler answers with a bare [`Response`].
///
/// Batch blocks dispatch a list of these one after another.
#[derive(Debug)]
pub struct PlainRequest(AnyRequest);

impl PlainRequest {
    #[must_use]
    pub fn new<R: Request<Response = Response>>(request: R) -> Self {
        Self(AnyRequest::new(request))
    }

    #[must_use]
    pub fn into_inner(self) -> AnyRequest {
        self.0
    }
}

/// Strips module paths from every path segment of a type name.
#[must_use]
pub fn short_type_name(full: &str) -> String {
    fn last_segment(path: &str) -> &str {
        path.rsplit("::").next().unwrap_or(path)
    }

    let mut out = String::with_capacity(full.len());
    let mut start = 0;
    for (idx, ch) in full.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';') {
            out.push_str(last_segment(&full[start..idx]));
            out.push(ch);
            start = idx + ch.len_utf8();
        }
    }
    out.push_str(last_segment(&full[start..]));
    out
}
