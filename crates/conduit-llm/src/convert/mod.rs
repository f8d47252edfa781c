//! Conversion between canonical types and the two wire dialects
//!
//! Each submodule decodes its dialect's request into a `CanonicalRequest`,
//! encodes a `CanonicalResponse` into its terminal body, and owns a stream
//! encoder turning `CanonicalEvent`s into its SSE frames.

pub mod anthropic;
pub mod openai;

use std::path::{Component, Path, PathBuf};

use conduit_config::LlmConfig;
use serde::de::DeserializeOwned;

use crate::error::GatewayError;

/// Inputs a decoder needs beyond the request body
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions<'a> {
    /// Generation defaults
    pub llm: &'a LlmConfig,
    /// Directory every agent `cwd` override must stay inside
    pub sandbox_root: Option<&'a Path>,
}

/// Identity of one response, shared by its terminal body and every chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Dialect-specific response id
    pub id: String,
    /// Model name echoed to the client
    pub model: String,
    /// Unix timestamp in seconds
    pub created: u64,
}

/// Parse a request body, reporting serde's diagnostic as a malformed request
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::MalformedRequest("request body is empty".to_owned()));
    }

    serde_json::from_slice(body).map_err(|e| GatewayError::MalformedRequest(e.to_string()))
}

/// Resolve a client `cwd` against the sandbox root without touching the filesystem
///
/// Relative paths are joined onto the root. Any `..` component, or an
/// absolute path outside the root, is rejected.
pub(crate) fn sandboxed_cwd(root: Option<&Path>, requested: &str) -> Result<PathBuf, GatewayError> {
    let root = root.ok_or_else(|| {
        GatewayError::MalformedRequest("cwd requires a configured sandbox working directory".to_owned())
    })?;

    let requested = Path::new(requested);
    if requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(GatewayError::MalformedRequest("cwd must not contain `..`".to_owned()));
    }

    let resolved = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(GatewayError::MalformedRequest(format!(
            "cwd must be inside {}",
            root.display()
        )))
    }
}

/// Serialize a wire value into SSE `data`
pub(crate) fn to_data<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize wire event");
        String::from("{}")
    })
}
