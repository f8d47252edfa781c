//! Protocol translation and agent relay for conduit
//!
//! Decodes Anthropic Messages and `OpenAI` Chat Completions requests into a
//! canonical form, runs them on a sandboxed backend agent, and relays the
//! agent's output back in the dialect the client spoke.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulate;
pub mod adapter;
pub mod backend;
pub mod convert;
pub mod error;
#[cfg(feature = "http")]
pub mod handler;
pub mod models;
pub mod policy;
pub mod protocol;
pub mod relay;
pub mod state;
pub mod types;

pub use adapter::{Dialect, SseFrame};
pub use backend::{Backend, EventStream, ProcessAgent};
pub use error::{AgentError, GatewayError};
#[cfg(feature = "http")]
pub use handler::{error_response, model_router};
pub use state::{Gateway, GatewayResponse, Readiness};
