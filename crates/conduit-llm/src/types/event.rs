use conduit_core::ErrorKind;
use serde::{Deserialize, Serialize};

use super::response::{StopReason, Usage};

/// One step of a streamed generation
///
/// A well-formed sequence is `MessageStarted`, then per block `BlockStarted`,
/// any number of `BlockDelta`, `BlockStopped`, with block indices assigned
/// from zero without gaps, and finally exactly one terminal event:
/// `MessageStopped` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    /// Generation began
    MessageStarted {
        /// Usage known at start, typically input tokens only
        usage: Usage,
    },
    /// A content block opened
    BlockStarted {
        /// Block index
        index: u32,
        /// What the block carries
        block: BlockKind,
    },
    /// Incremental block content
    BlockDelta {
        /// Block index
        index: u32,
        /// Fragment
        delta: BlockDelta,
    },
    /// A content block closed
    BlockStopped {
        /// Block index
        index: u32,
    },
    /// Generation finished normally
    MessageStopped {
        /// Why it ended
        stop_reason: StopReason,
        /// Final usage
        usage: Usage,
    },
    /// Generation failed
    Error(ErrorReport),
}

impl CanonicalEvent {
    /// Whether no event may follow this one
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageStopped { .. } | Self::Error(_))
    }

    /// Terminal error event
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error(ErrorReport {
            kind,
            message: message.into(),
        })
    }
}

/// Kind of a content block, known when it opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    /// Text
    Text,
    /// Tool call whose arguments stream as deltas
    ToolCall {
        /// Call identifier
        id: String,
        /// Tool name
        name: String,
    },
}

/// Fragment of block content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment
    Text(String),
    /// Fragment of tool arguments JSON
    ToolArguments(String),
}

/// Client-safe description of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable classification
    pub kind: ErrorKind,
    /// Message safe to show the client
    pub message: String,
}

impl ErrorReport {
    /// Report for any error that knows its client-facing shape
    pub fn from_error(error: &dyn conduit_core::HttpError) -> Self {
        Self {
            kind: error.kind(),
            message: error.client_message(),
        }
    }
}
