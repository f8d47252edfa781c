use serde::{Deserialize, Serialize};

use super::message::{ContentBlock, Message, Role};

/// Complete assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Assistant content in order
    pub content: Vec<ContentBlock>,
    /// Why generation ended
    pub stop_reason: StopReason,
    /// Token usage
    pub usage: Usage,
}

impl CanonicalResponse {
    /// Full text of the response
    pub fn text(&self) -> String {
        self.as_message().joined_text()
    }

    /// View the response as an assistant message
    pub fn as_message(&self) -> Message {
        Message {
            role: Role::Assistant,
            content: self.content.clone(),
        }
    }
}

/// Reason generation ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the turn
    #[default]
    EndTurn,
    /// Output token limit reached
    MaxTokens,
    /// A stop sequence matched
    StopSequence,
    /// The turn ended on tool calls
    ToolUse,
    /// The model declined to answer
    Refusal,
}

impl StopReason {
    /// Parse the agent's native stop reason
    ///
    /// Values this gateway does not know map to `EndTurn`.
    pub fn from_native(value: &str) -> Self {
        match value {
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "tool_use" => Self::ToolUse,
            "refusal" => Self::Refusal,
            _ => Self::EndTurn,
        }
    }
}

/// Token counts for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Generated tokens
    pub output_tokens: u32,
}

impl Usage {
    /// Prompt plus generated tokens
    pub const fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}
