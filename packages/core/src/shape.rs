//! Type-erased responses.
//!
//! Blocks in one execution context return different payload types. Every
//! response shape erases into [`AnyResponse`], a closed union that keeps the
//! payload behind an `Arc<dyn Any>` and recovers it with typed accessors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::response::{ListResponse, Response, TypedResponse};
use crate::result::ResultCode;

/// Erased payload storage. `List` stores an `Arc<Vec<T>>` here.
pub type Payload = Arc<dyn Any + Send + Sync>;

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::response::Response {}
    impl<T> Sealed for crate::response::TypedResponse<T> {}
    impl<T> Sealed for crate::response::ListResponse<T> {}
}

/// Implemented by the three response shapes handlers may return.
pub trait ResponseShape: sealed::Sealed + Send + 'static {
    fn status(&self) -> &Response;

    fn into_any(self) -> AnyResponse;
}

impl ResponseShape for Response {
    fn status(&self) -> &Response {
        self
    }

    fn into_any(self) -> AnyResponse {
        AnyResponse::Plain(self)
    }
}

impl<T: Send + Sync + 'static> ResponseShape for TypedResponse<T> {
    fn status(&self) -> &Response {
        &self.status
    }

    fn into_any(self) -> AnyResponse {
        AnyResponse::Typed {
            status: self.status,
            data: self.data.map(|d| Arc::new(d) as Payload),
        }
    }
}

impl<T: Send + Sync + 'static> ResponseShape for ListResponse<T> {
    fn status(&self) -> &Response {
        &self.status
    }

    fn into_any(self) -> AnyResponse {
        AnyResponse::List {
            status: self.status,
            len: self.data.len(),
            data: Arc::new(self.data),
        }
    }
}

/// Closed union over every response shape, plus the aggregate produced by a
/// concurrency group.
#[derive(Clone)]
pub enum AnyResponse {
    Plain(Response),
    Typed {
        status: Response,
        data: Option<Payload>,
    },
    List {
        status: Response,
        data: Payload,
        len: usize,
    },
    /// Fan-in of a concurrency group. Members keep insertion order; `None`
    /// marks a member rejected by its pre or post condition.
    Group {
        status: Response,
        members: Vec<Option<AnyResponse>>,
    },
}

impl AnyResponse {
    #[must_use]
    pub fn group(status: Response, members: Vec<Option<AnyResponse>>) -> Self {
        AnyResponse::Group { status, members }
    }

    #[must_use]
    pub fn status(&self) -> &Response {
        match self {
            AnyResponse::Plain(status)
            | AnyResponse::Typed { status, .. }
            | AnyResponse::List { status, .. }
            | AnyResponse::Group { status, .. } => status,
        }
    }

    pub fn status_mut(&mut self) -> &mut Response {
        match self {
            AnyResponse::Plain(status)
            | AnyResponse::Typed { status, .. }
            | AnyResponse::List { status, .. }
            | AnyResponse::Group { status, .. } => status,
        }
    }

    #[must_use]
    pub fn into_status(self) -> Response {
        match self {
            AnyResponse::Plain(status)
            | AnyResponse::Typed { status, .. }
            | AnyResponse::List { status, .. }
            | AnyResponse::Group { status, .. } => status,
        }
    }

    #[must_use]
    pub fn result_code(&self) -> ResultCode {
        self.status().result_code
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status().succeeded()
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.status().message.as_deref()
    }

    #[must_use]
    pub fn info(&self) -> Option<&str> {
        self.status().info.as_deref()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.status().count
    }

    #[must_use]
    pub fn interrupt(&self) -> bool {
        self.status().interrupt
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, AnyResponse::Group { .. })
    }

    /// Shared handle to a single payload of type `T`.
    ///
    /// `None` for payload-free and list shapes, for an absent payload and
    /// for a payload of a different type.
    #[must_use]
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            AnyResponse::Typed { data: Some(p), .. } => Arc::clone(p).downcast::<T>().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn data_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            AnyResponse::Typed { data: Some(p), .. } => p.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Shared handle to a list payload of element type `T`.
    #[must_use]
    pub fn list<T: Any + Send + Sync>(&self) -> Option<Arc<Vec<T>>> {
        match self {
            AnyResponse::List { data, .. } => Arc::clone(data).downcast::<Vec<T>>().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn list_ref<T: Any + Send + Sync>(&self) -> Option<&[T]> {
        match self {
            AnyResponse::List { data, .. } => data.downcast_ref::<Vec<T>>().map(Vec::as_slice),
            _ => None,
        }
    }

    /// Raw group members in insertion order.
    #[must_use]
    pub fn members(&self) -> Option<&[Option<AnyResponse>]> {
        match self {
            AnyResponse::Group { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Payload of the group member at `index`, read as `T`.
    #[must_use]
    pub fn member<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.members()?.get(index)?.as_ref()?.data::<T>()
    }

    /// Number of items physically carried: 1 or 0 for single payloads, the
    /// vector length for lists and the member count for groups.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            AnyResponse::Plain(_) => 0,
            AnyResponse::Typed { data, .. } => usize::from(data.is_some()),
            AnyResponse::List { len, .. } => *len,
            AnyResponse::Group { members, .. } => members.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the single payload out as an owned `T`, cloning only when the
    /// payload is still shared (for example with a cached copy).
    ///
    /// A list payload of `X` items converts when `T` is `Vec<X>`. Groups never
    /// convert; use [`into_list`](Self::into_list) for them.
    #[must_use]
    pub fn into_data<T: Any + Send + Sync + Clone>(self) -> Option<T> {
        match self {
            AnyResponse::Typed { data: Some(p), .. } | AnyResponse::List { data: p, .. } => {
                p.downcast::<T>().ok().map(Arc::unwrap_or_clone)
            }
            _ => None,
        }
    }

    /// Takes a list payload out as an owned `Vec<T>`.
    ///
    /// A group converts when every member carries a `T`; a rejected or
    /// differently typed member makes the whole conversion `None`.
    #[must_use]
    pub fn into_list<T: Any + Send + Sync + Clone>(self) -> Option<Vec<T>> {
        match self {
            AnyResponse::List { data, .. } => {
                data.downcast::<Vec<T>>().ok().map(Arc::unwrap_or_clone)
            }
            AnyResponse::Group { members, .. } => members
                .into_iter()
                .map(|m| m.and_then(AnyResponse::into_data::<T>))
                .collect(),
            _ => None,
        }
    }
}

impl fmt::Debug for AnyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyResponse::Plain(status) => f.debug_tuple("Plain").field(status).finish(),
            AnyResponse::Typed { status, data } => f
                .debug_struct("Typed")
                .field("status", status)
                .field("has_data", &data.is_some())
                .finish(),
            AnyResponse::List { status, len, .. } => f
                .debug_struct("List")
                .field("status", status)
                .field("len", len)
                .finish(),
            AnyResponse::Group { status, members } => f
                .debug_struct("Group")
                .field("status", status)
                .field("members", members)
                .finish(),
        }
    }
}

impl From<Response> for AnyResponse {
    fn from(resp: Response) -> Self {
        resp.into_any()
    }
}

impl<T: Send + Sync + 'static> From<TypedResponse<T>> for AnyResponse {
    fn from(resp: TypedResponse<T>) -> Self {
        resp.into_any()
    }
}

impl<T: Send + Sync + 'static> From<ListResponse<T>> for AnyResponse {
    fn from(resp: ListResponse<T>) -> Self {
        resp.into_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Customer {
        id: u32,
        name: String,
    }

    fn alice() -> Customer {
        Customer {
            id: 1,
            name: "alice".to_string(),
        }
    }

    #[test]
    fn typed_payload_is_recovered_by_type() {
        let any = TypedResponse::success(alice()).into_any();
        assert_eq!(any.data_ref::<Customer>(), Some(&alice()));
        assert_eq!(any.data::<Customer>().as_deref(), Some(&alice()));
        assert!(any.data::<String>().is_none());
        assert!(any.list::<Customer>().is_none());
    }

    #[test]
    fn list_payload_keeps_total_count() {
        let any = ListResponse::success(vec![1_u32, 2, 3]).with_total(10).into_any();
        assert_eq!(any.count(), 10);
        assert_eq!(any.len(), 3);
        assert_eq!(any.list_ref::<u32>(), Some(&[1, 2, 3][..]));
        assert!(any.list::<i64>().is_none());
    }

    #[test]
    fn into_data_clones_only_when_shared() {
        let any = TypedResponse::success(alice()).into_any();
        let cached = any.clone();
        assert_eq!(any.into_data::<Customer>(), Some(alice()));
        assert_eq!(cached.into_data::<Customer>().map(|c| c.id), Some(1));
    }

    #[test]
    fn list_payload_converts_into_vec_data() {
        let any = ListResponse::success(vec![alice()]).with_total(4).into_any();
        assert_eq!(any.clone().into_data::<Vec<Customer>>(), Some(vec![alice()]));
        assert!(any.clone().into_data::<Customer>().is_none());
        let group = AnyResponse::group(Response::success(), vec![Some(any)]);
        assert!(group.into_data::<Vec<Customer>>().is_none());
    }

    #[test]
    fn group_members_are_indexed_in_order() {
        let members = vec![
            Some(TypedResponse::success(10_u32).into_any()),
            None,
            Some(TypedResponse::success(30_u32).into_any()),
        ];
        let group = AnyResponse::group(Response::success().with_info("fanout"), members);

        assert!(group.is_group());
        assert_eq!(group.len(), 3);
        assert_eq!(group.member::<u32>(0).as_deref(), Some(&10));
        assert!(group.member::<u32>(1).is_none());
        assert_eq!(group.member::<u32>(2).as_deref(), Some(&30));
        assert!(group.member::<u32>(3).is_none());
        // A rejected member blocks conversion of the whole group.
        assert_eq!(group.into_list::<u32>(), None);
    }

    #[test]
    fn complete_group_converts_into_list() {
        let members = vec![
            Some(TypedResponse::success("a".to_string()).into_any()),
            Some(TypedResponse::success("b".to_string()).into_any()),
        ];
        let group = AnyResponse::group(Response::success(), members);
        assert_eq!(
            group.into_list::<String>(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn status_accessors_cover_every_shape() {
        let plain = AnyResponse::from(Response::failure(ResultCode::FailureForbidden, "no").interrupted());
        assert_eq!(plain.result_code(), ResultCode::FailureForbidden);
        assert_eq!(plain.message(), Some("no"));
        assert!(plain.interrupt());
        assert!(plain.is_empty());

        let mut typed = AnyResponse::from(TypedResponse::success(1_u8));
        typed.status_mut().info = Some("block".to_string());
        assert_eq!(typed.info(), Some("block"));
        assert_eq!(typed.into_status().count, 1);
    }
}
