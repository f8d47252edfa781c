use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::message::{ContentBlock, Message, Role};
use super::tool::{Tool, ToolChoice};

/// Dialect-neutral model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    /// Model the client asked for
    pub model: String,
    /// Conversation in order
    pub messages: Vec<Message>,
    /// Declared tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Tool selection constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether the client accepts more than one tool call per turn
    pub parallel_tool_calls: bool,
    /// Sampling parameters
    pub params: GenerationParams,
    /// Whether the client asked for a streamed response
    pub stream: bool,
    /// Options for the backend agent itself
    #[serde(default)]
    pub agent: AgentOptions,
}

/// Generation parameters; `None` leaves the choice to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Output token limit
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Sequences that end generation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

/// Agent-specific knobs that have no equivalent in either wire dialect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Extended thinking budget in tokens
    pub thinking_budget: Option<u32>,
    /// Agentic turn limit
    pub max_turns: Option<u32>,
    /// Agent tool allow-list
    pub allowed_tools: Option<Vec<String>>,
    /// Agent permission mode
    pub permission_mode: Option<String>,
    /// Working directory, relative to or inside the sandbox directory
    pub cwd: Option<PathBuf>,
}

impl CanonicalRequest {
    /// Check the structural invariants every decoded request must satisfy
    ///
    /// Messages are non-empty, every tool result answers a tool call made
    /// earlier in the same request, and the conversation ends on a user or
    /// tool turn.
    pub fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("at least one message is required".to_owned());
        }

        let mut seen_calls: HashSet<&str> = HashSet::new();

        for (position, message) in self.messages.iter().enumerate() {
            for block in &message.content {
                match block {
                    ContentBlock::ToolCall { id, .. } => {
                        if message.role != Role::Assistant {
                            return Err(format!("messages.{position}: only assistant messages may call tools"));
                        }
                        seen_calls.insert(id);
                    }
                    ContentBlock::ToolResult { call_id, .. } => {
                        if !seen_calls.contains(call_id.as_str()) {
                            return Err(format!(
                                "messages.{position}: tool result references unknown tool call `{call_id}`"
                            ));
                        }
                    }
                    ContentBlock::Text { .. } | ContentBlock::Image { .. } => {
                        if message.role == Role::Tool {
                            return Err(format!("messages.{position}: tool messages may only carry tool results"));
                        }
                    }
                }
            }
        }

        match self.messages.last().map(|m| m.role) {
            Some(Role::User | Role::Tool) => Ok(()),
            _ => Err("the final message must come from the user or a tool".to_owned()),
        }
    }

    /// System prompt assembled from every system message
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::joined_text)
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }
}

/// Append `message`, merging consecutive tool turns into one
///
/// Both dialects can express several results for one assistant turn; the
/// canonical form always holds them in a single tool message.
pub fn push_message(messages: &mut Vec<Message>, message: Message) {
    if message.role == Role::Tool
        && let Some(last) = messages.last_mut()
        && last.role == Role::Tool
    {
        last.content.extend(message.content);
        return;
    }

    messages.push(message);
}
