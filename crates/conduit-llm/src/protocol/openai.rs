//! Chat Completions wire types
//!
//! Unknown request fields (`user`, `metadata`, `store`, ...) are ignored,
//! matching the upstream API. Absent optional fields are omitted on output
//! unless the upstream schema shows them as explicit nulls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

// -- Requests --

/// `POST /v1/chat/completions` body
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub temperature: Option<f32>,
    /// Accepted, never forwarded
    pub top_p: Option<f32>,
    /// Legacy spelling of `max_completion_tokens`
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    pub stop: Option<OpenAiStop>,
    /// Anything other than 1 is rejected
    pub n: Option<u32>,
    pub stream: Option<bool>,
    pub stream_options: Option<OpenAiStreamOptions>,
    pub tools: Option<Vec<OpenAiTool>>,
    /// `"auto"`, `"none"`, `"required"` or `{"type":"function",...}`
    pub tool_choice: Option<Value>,
    pub parallel_tool_calls: Option<bool>,
    /// Pre-tools function calling
    pub functions: Option<Vec<OpenAiFunction>>,
    /// Pre-tools counterpart of `tool_choice`
    pub function_call: Option<Value>,
    pub response_format: Option<OpenAiResponseFormat>,
}

/// `response_format` object
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponseFormat {
    /// `text`, `json_object` or `json_schema`
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: Option<Value>,
}

/// `stop` accepts a bare string as well as a list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiStop {
    One(String),
    Many(Vec<String>),
}

impl OpenAiStop {
    /// Sequences as a list
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop],
            Self::Many(stops) => stops,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamOptions {
    /// Append a usage-only chunk before `[DONE]`
    #[serde(default)]
    pub include_usage: bool,
}

/// One entry of `messages`
///
/// `role` is kept as a string so an unknown role can be reported by name
/// instead of failing deserialization.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: Option<OpenAiContent>,
    /// Function name on legacy `function` role messages
    pub name: Option<String>,
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    pub tool_call_id: Option<String>,
    pub function_call: Option<OpenAiFunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

/// Remote URL or `data:` URI
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageUrl {
    pub url: String,
    pub detail: Option<String>,
}

/// Entry of `tools`; `tool_type` must be `function`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the arguments object
    pub parameters: Option<Value>,
}

/// Tool call on an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON text, not an object
    pub arguments: String,
}

// -- Complete responses --

/// `chat.completion` object
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    pub id: String,
    pub object: String,
    /// Unix seconds
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiChoiceMessage,
    pub finish_reason: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoiceMessage {
    pub role: String,
    /// Explicit null on tool-only turns
    #[serialize_always]
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// -- Streaming --

/// `chat.completion.chunk` object, one per SSE `data:` line
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    /// Empty on the trailing usage chunk
    pub choices: Vec<OpenAiStreamChoice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChoice {
    pub index: u32,
    pub delta: OpenAiStreamDelta,
    /// Null until the closing chunk
    pub finish_reason: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamDelta {
    /// Only on the first chunk of a choice
    pub role: Option<String>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Fragment of a tool call; `id`, type and name arrive once, arguments in pieces
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamToolCall {
    /// Position in the message's `tool_calls`
    pub index: u32,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub tool_type: Option<String>,
    pub function: Option<OpenAiStreamFunctionCall>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamFunctionCall {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// -- GET /v1/models --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiModelList {
    /// Always `list`
    pub object: String,
    pub data: Vec<OpenAiModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
    /// Always `model`
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub owned_by: String,
}

// -- Errors --

/// `{"error": {...}}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorResponse {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    /// Always null; kept because clients expect the key
    pub param: Option<String>,
    /// Stable `ErrorKind` code
    pub code: Option<String>,
}
