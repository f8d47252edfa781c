//! Messages API wire types
//!
//! Unlike the chat completions surface, unknown top-level request fields
//! are rejected, as the upstream API does.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use serde_with::skip_serializing_none;

// -- Requests --

/// `POST /v1/messages` body
///
/// The trailing group of fields are agent extensions with no upstream
/// equivalent; they tune the backend run instead of the model call.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicRequest {
    pub model: String,
    /// Required, and must be non-zero
    pub max_tokens: u32,
    pub system: Option<AnthropicSystem>,
    pub messages: Vec<AnthropicMessage>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub stream: Option<bool>,
    pub tools: Option<Vec<AnthropicTool>>,
    pub tool_choice: Option<AnthropicToolChoice>,
    pub thinking: Option<AnthropicThinking>,
    pub metadata: Option<Value>,
    pub service_tier: Option<String>,

    /// Overrides `thinking.budget_tokens`
    pub max_thinking_tokens: Option<u32>,
    pub max_turns: Option<u32>,
    pub allowed_tools: Option<Vec<String>>,
    pub permission_mode: Option<String>,
    /// Must resolve inside the sandbox working directory
    pub cwd: Option<String>,
}

/// `system` is either a string or a list of text blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicSystem {
    Text(String),
    Blocks(Vec<AnthropicTextBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTextBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

/// Only two roles exist on this surface; system text lives in `system`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnthropicRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: AnthropicRole,
    pub content: AnthropicContent,
}

/// String shorthand or a block list
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

// Untagged and internally tagged derives buffer their input, which loses the
// raw `tool_use.input` bytes. Both are read from the captured JSON instead.
impl<'de> Deserialize<'de> for AnthropicContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        if raw.get().starts_with('"') {
            serde_json::from_str(raw.get()).map(Self::Text).map_err(D::Error::custom)
        } else {
            serde_json::from_str(raw.get()).map(Self::Blocks).map_err(D::Error::custom)
        }
    }
}

/// Block accepted inside a request message
///
/// Thinking blocks from earlier assistant turns are accepted so clients can
/// replay a transcript verbatim; they are dropped during decoding.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    /// `input` keeps the exact JSON text the client sent
    ToolUse {
        id: String,
        name: String,
        input: Box<RawValue>,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<AnthropicToolResultContent>,
        is_error: Option<bool>,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
}

impl<'de> Deserialize<'de> for AnthropicContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct ToolInput {
            input: Box<RawValue>,
        }

        let raw = Box::<RawValue>::deserialize(deserializer)?;
        let block: BlockFields = serde_json::from_str(raw.get()).map_err(D::Error::custom)?;

        Ok(match block {
            BlockFields::Text { text } => Self::Text { text },
            BlockFields::Image { source } => Self::Image { source },
            BlockFields::ToolUse { id, name } => {
                let ToolInput { input } = serde_json::from_str(raw.get()).map_err(D::Error::custom)?;
                Self::ToolUse { id, name, input }
            }
            BlockFields::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Self::ToolResult {
                tool_use_id,
                content,
                is_error,
            },
            BlockFields::Thinking { thinking, signature } => Self::Thinking { thinking, signature },
            BlockFields::RedactedThinking { data } => Self::RedactedThinking { data },
        })
    }
}

/// `AnthropicContentBlock` minus the raw `tool_use.input`
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockFields {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<AnthropicToolResultContent>,
        is_error: Option<bool>,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicToolResultBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicToolResultBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// `tool_choice` object
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicToolChoice {
    /// `auto`, `any`, `tool` or `none`
    #[serde(rename = "type")]
    pub choice_type: String,
    /// Set only with `tool`
    pub name: Option<String>,
    pub disable_parallel_tool_use: Option<bool>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicThinking {
    /// `enabled` or `disabled`
    #[serde(rename = "type")]
    pub thinking_type: String,
    pub budget_tokens: Option<u32>,
}

// -- Complete responses --

/// `message` object
///
/// `stop_reason` and `stop_sequence` serialize as null rather than being
/// omitted.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<AnthropicResponseBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: AnthropicUsage,
}

/// Only text and tool calls are relayed in a terminal body
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Box<RawValue>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming --

/// One SSE event; the `event:` line carries the same name as `type`
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: AnthropicStreamContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: AnthropicStreamDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    /// Stop reason and cumulative output usage
    MessageDelta {
        delta: AnthropicMessageDelta,
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorDetail,
    },
}

impl AnthropicStreamEvent {
    /// SSE `event:` name
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
        }
    }
}

/// The `message` of `message_start`: empty content, null stop fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicStreamMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<Value>,
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamContentBlock {
    Text {
        text: String,
    },
    /// `input` starts as `{}`; the arguments follow as `input_json_delta`s
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    /// Thinking, signature and citation deltas
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

// -- Errors --

/// `{"type": "error", "error": {...}}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub error: AnthropicErrorDetail,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// Stable `ErrorKind` code, an addition to the upstream shape
    pub code: Option<String>,
}
