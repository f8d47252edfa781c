//! Types shared by every conduit crate: the error taxonomy, the HTTP error
//! contract, and per-request client context

pub mod context;
pub mod error;
pub mod headers;

pub use context::{ClientIdentity, IdentitySource, RequestContext};
pub use error::{ErrorKind, HttpError};
