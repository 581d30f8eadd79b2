//! IOSP core: result codes, response shapes and type-erased requests shared
//! by handlers and the execution engine.

pub mod request;
pub mod response;
pub mod result;
pub mod shape;

pub use request::{AnyRequest, PlainRequest, Request};
pub use response::{ListResponse, Response, TypedResponse};
pub use result::{ResultCode, SUCCESS_THRESHOLD};
pub use shape::{AnyResponse, Payload, ResponseShape};
