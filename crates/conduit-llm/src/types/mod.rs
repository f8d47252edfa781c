//! Canonical, dialect-neutral model of requests, responses, and stream events
//!
//! Both wire dialects decode into and encode from these types; nothing
//! outside `convert` and `protocol` sees a wire shape.

pub mod event;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use event::{BlockDelta, BlockKind, CanonicalEvent, ErrorReport};
pub use message::{ContentBlock, MediaSource, Message, Role};
pub use request::{AgentOptions, CanonicalRequest, GenerationParams, push_message};
pub use response::{CanonicalResponse, StopReason, Usage};
pub use tool::{Tool, ToolChoice};
