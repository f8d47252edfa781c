//! Conversion between canonical types and the `OpenAI` Chat Completions dialect

use std::collections::HashMap;

use conduit_core::ErrorKind;
use http::StatusCode;

use super::{DecodeOptions, ResponseMeta, parse_body, to_data};
use crate::adapter::{Decoded, SseFrame};
use crate::error::GatewayError;
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiErrorDetail, OpenAiErrorResponse,
    OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiResponseFormat, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamFunctionCall,
    OpenAiStreamOptions, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    AgentOptions, BlockDelta, BlockKind, CanonicalEvent, CanonicalRequest, CanonicalResponse, ContentBlock,
    GenerationParams, MediaSource, Message, Role, StopReason, Tool, ToolChoice, Usage, push_message,
};

const MAX_STOP_SEQUENCES: usize = 4;
const MAX_TOOLS: usize = 128;

// -- Inbound: OpenAI wire format -> canonical --

/// Decode and validate a `POST /v1/chat/completions` body
pub fn decode(body: &[u8], options: DecodeOptions<'_>) -> Result<Decoded, GatewayError> {
    let wire: OpenAiRequest = parse_body(body)?;

    if wire.messages.is_empty() {
        return Err(malformed("At least one message is required"));
    }
    if wire.n.is_some_and(|n| n > 1) {
        return Err(malformed("n: only a single choice is supported"));
    }

    let include_usage = wire.stream_options.as_ref().is_some_and(|o| o.include_usage);
    let request = request_from_wire(wire, options)?;
    request.validate().map_err(GatewayError::MalformedRequest)?;

    Ok(Decoded { request, include_usage })
}

fn request_from_wire(req: OpenAiRequest, options: DecodeOptions<'_>) -> Result<CanonicalRequest, GatewayError> {
    let stop_sequences = req.stop.map(|stop| stop.into_vec()).unwrap_or_default();
    if stop_sequences.len() > MAX_STOP_SEQUENCES {
        return Err(malformed(format!("Maximum {MAX_STOP_SEQUENCES} stop sequences allowed")));
    }

    let mut tools = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        if tool.tool_type != "function" {
            return Err(malformed(format!("tools: unsupported tool type `{}`", tool.tool_type)));
        }
        tools.push(tool_from_wire(tool.function));
    }
    tools.extend(req.functions.unwrap_or_default().into_iter().map(tool_from_wire));
    if tools.len() > MAX_TOOLS {
        return Err(malformed(format!("Maximum {MAX_TOOLS} tools allowed")));
    }

    let tool_choice = match (req.tool_choice, req.function_call) {
        (Some(choice), _) => Some(tool_choice_from_wire(&choice)?),
        (None, Some(choice)) => Some(function_call_from_wire(&choice)?),
        (None, None) => None,
    };

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    let mut function_calls: HashMap<String, String> = HashMap::new();

    for (position, message) in req.messages.into_iter().enumerate() {
        push_message(&mut messages, message_from_wire(position, message, &mut function_calls)?);
    }

    if let Some(format) = req.response_format
        && let Some(instruction) = response_format_instruction(format)?
    {
        let at = messages.iter().take_while(|m| m.role == Role::System).count();
        messages.insert(at, Message::text(Role::System, instruction));
    }

    Ok(CanonicalRequest {
        model: req.model,
        messages,
        tools,
        tool_choice,
        parallel_tool_calls: req.parallel_tool_calls.unwrap_or(true),
        params: GenerationParams {
            max_tokens: Some(
                req.max_completion_tokens
                    .or(req.max_tokens)
                    .unwrap_or(options.llm.default_max_tokens),
            ),
            temperature: req.temperature.or(options.llm.default_temperature),
            stop_sequences,
        },
        stream: req.stream.unwrap_or(false),
        agent: AgentOptions::default(),
    })
}

fn message_from_wire(
    position: usize,
    msg: OpenAiMessage,
    function_calls: &mut HashMap<String, String>,
) -> Result<Message, GatewayError> {
    match msg.role.as_str() {
        "system" | "developer" => Ok(Message {
            role: Role::System,
            content: content_from_wire(msg.content),
        }),
        "user" => Ok(Message {
            role: Role::User,
            content: content_from_wire(msg.content),
        }),
        "assistant" => {
            let mut content = content_from_wire(msg.content);

            for call in msg.tool_calls.unwrap_or_default() {
                content.push(ContentBlock::ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                });
            }

            if let Some(call) = msg.function_call {
                let id = format!("call_fn_{position}");
                function_calls.insert(call.name.clone(), id.clone());
                content.push(ContentBlock::ToolCall {
                    id,
                    name: call.name,
                    arguments: call.arguments,
                });
            }

            Ok(Message {
                role: Role::Assistant,
                content,
            })
        }
        "tool" => {
            let call_id = msg
                .tool_call_id
                .ok_or_else(|| malformed(format!("messages.{position}.tool_call_id: field required")))?;
            Ok(tool_result(call_id, msg.content))
        }
        "function" => {
            let name = msg
                .name
                .ok_or_else(|| malformed(format!("messages.{position}.name: field required")))?;
            let call_id = function_calls.get(&name).cloned().ok_or_else(|| {
                malformed(format!("messages.{position}: no prior function_call named `{name}`"))
            })?;
            Ok(tool_result(call_id, msg.content))
        }
        other => Err(malformed(format!("messages.{position}.role: unsupported role `{other}`"))),
    }
}

fn tool_result(call_id: String, content: Option<OpenAiContent>) -> Message {
    let content = content_from_wire(content)
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        })
        .collect();

    Message {
        role: Role::Tool,
        content: vec![ContentBlock::ToolResult {
            call_id,
            content,
            is_error: false,
        }],
    }
}

fn content_from_wire(content: Option<OpenAiContent>) -> Vec<ContentBlock> {
    match content {
        None => Vec::new(),
        Some(OpenAiContent::Text(text)) if text.is_empty() => Vec::new(),
        Some(OpenAiContent::Text(text)) => vec![ContentBlock::Text { text }],
        Some(OpenAiContent::Parts(parts)) => parts
            .into_iter()
            .map(|part| match part {
                OpenAiContentPart::Text { text } => ContentBlock::Text { text },
                OpenAiContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    source: MediaSource::from_uri(&image_url.url),
                },
            })
            .collect(),
    }
}

fn tool_from_wire(function: OpenAiFunction) -> Tool {
    Tool {
        name: function.name,
        description: function.description,
        parameters: function
            .parameters
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
    }
}

fn tool_choice_from_wire(choice: &serde_json::Value) -> Result<ToolChoice, GatewayError> {
    match choice {
        serde_json::Value::String(mode) => match mode.as_str() {
            "auto" => Ok(ToolChoice::Auto),
            "required" => Ok(ToolChoice::Any),
            "none" => Ok(ToolChoice::None),
            other => Err(malformed(format!("tool_choice: unsupported value `{other}`"))),
        },
        serde_json::Value::Object(object) => object
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(serde_json::Value::as_str)
            .map(|name| ToolChoice::Tool { name: name.to_owned() })
            .ok_or_else(|| malformed("tool_choice.function.name: field required")),
        _ => Err(malformed("tool_choice: expected a string or an object")),
    }
}

fn function_call_from_wire(choice: &serde_json::Value) -> Result<ToolChoice, GatewayError> {
    match choice {
        serde_json::Value::String(mode) if mode == "auto" => Ok(ToolChoice::Auto),
        serde_json::Value::String(mode) if mode == "none" => Ok(ToolChoice::None),
        serde_json::Value::Object(object) => object
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map(|name| ToolChoice::Tool { name: name.to_owned() })
            .ok_or_else(|| malformed("function_call.name: field required")),
        _ => Err(malformed("function_call: expected \"auto\", \"none\", or an object")),
    }
}

/// System instruction that stands in for `response_format`
fn response_format_instruction(format: OpenAiResponseFormat) -> Result<Option<String>, GatewayError> {
    match (format.format_type.as_str(), format.json_schema) {
        ("text", None) => Ok(None),
        ("json_object", None) => Ok(Some("Respond with a single valid JSON object and nothing else.".to_owned())),
        ("json_object" | "text", Some(_)) => Err(malformed(
            "json_schema should only be provided when type is 'json_schema'",
        )),
        ("json_schema", Some(schema)) => {
            let schema = schema.get("schema").cloned().unwrap_or(schema);
            Ok(Some(format!(
                "Respond with a single valid JSON object and nothing else. It must match this JSON Schema:\n{schema}"
            )))
        }
        ("json_schema", None) => Err(malformed("json_schema must be provided when type is 'json_schema'")),
        (other, _) => Err(malformed(format!("response_format.type: unsupported value `{other}`"))),
    }
}

// -- Outbound: canonical -> OpenAI wire format --

/// Encode a canonical request as an `OpenAI` request body
pub fn encode_request(req: &CanonicalRequest) -> OpenAiRequest {
    let mut messages = Vec::with_capacity(req.messages.len());

    for message in &req.messages {
        match message.role {
            Role::System => messages.push(plain_message("system", Some(OpenAiContent::Text(message.joined_text())))),
            Role::User => messages.push(plain_message("user", Some(content_to_wire(&message.content)))),
            Role::Assistant => {
                let text = message.joined_text();
                let tool_calls: Vec<OpenAiToolCall> = message
                    .tool_calls()
                    .map(|(id, name, arguments)| OpenAiToolCall {
                        id: id.to_owned(),
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: name.to_owned(),
                            arguments: arguments.to_owned(),
                        },
                    })
                    .collect();

                messages.push(OpenAiMessage {
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    ..plain_message("assistant", (!text.is_empty()).then_some(OpenAiContent::Text(text)))
                });
            }
            Role::Tool => {
                for block in &message.content {
                    if let ContentBlock::ToolResult { call_id, content, .. } = block {
                        messages.push(OpenAiMessage {
                            tool_call_id: Some(call_id.clone()),
                            ..plain_message("tool", Some(OpenAiContent::Text(content.clone())))
                        });
                    }
                }
            }
        }
    }

    OpenAiRequest {
        model: req.model.clone(),
        messages,
        temperature: req.params.temperature,
        top_p: None,
        max_tokens: None,
        max_completion_tokens: req.params.max_tokens,
        stop: (!req.params.stop_sequences.is_empty())
            .then(|| crate::protocol::openai::OpenAiStop::Many(req.params.stop_sequences.clone())),
        n: None,
        stream: req.stream.then_some(true),
        tools: (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|tool| OpenAiTool {
                    tool_type: "function".to_owned(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: Some(tool.parameters.clone()),
                    },
                })
                .collect()
        }),
        tool_choice: req.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Any => serde_json::json!("required"),
            ToolChoice::None => serde_json::json!("none"),
            ToolChoice::Tool { name } => serde_json::json!({"type": "function", "function": {"name": name}}),
        }),
        parallel_tool_calls: (!req.parallel_tool_calls).then_some(false),
        functions: None,
        function_call: None,
        stream_options: req.stream.then_some(OpenAiStreamOptions { include_usage: true }),
        response_format: None,
    }
}

fn plain_message(role: &str, content: Option<OpenAiContent>) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_owned(),
        content,
        name: None,
        tool_calls: None,
        tool_call_id: None,
        function_call: None,
    }
}

fn content_to_wire(blocks: &[ContentBlock]) -> OpenAiContent {
    if let [ContentBlock::Text { text }] = blocks {
        return OpenAiContent::Text(text.clone());
    }

    OpenAiContent::Parts(
        blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(OpenAiContentPart::Text { text: text.clone() }),
                ContentBlock::Image { source } => Some(OpenAiContentPart::ImageUrl {
                    image_url: OpenAiImageUrl {
                        url: source.to_uri(),
                        detail: None,
                    },
                }),
                ContentBlock::ToolCall { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect(),
    )
}

/// Encode a complete response as the terminal body
pub fn encode_response(response: &CanonicalResponse, meta: &ResponseMeta) -> OpenAiResponse {
    let message = response.as_message();
    let tool_calls: Vec<OpenAiToolCall> = message
        .tool_calls()
        .map(|(id, name, arguments)| OpenAiToolCall {
            id: id.to_owned(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: name.to_owned(),
                arguments: arguments.to_owned(),
            },
        })
        .collect();
    let text = message.joined_text();

    OpenAiResponse {
        id: meta.id.clone(),
        object: "chat.completion".to_owned(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: Some(finish_reason(response.stop_reason).to_owned()),
        }],
        usage: Some(usage_to_wire(response.usage)),
    }
}

/// `OpenAI` finish reason for a stop reason
pub const fn finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => "stop",
        StopReason::MaxTokens => "length",
        StopReason::ToolUse => "tool_calls",
        StopReason::Refusal => "content_filter",
    }
}

const fn usage_to_wire(usage: Usage) -> OpenAiUsage {
    OpenAiUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total(),
    }
}

// -- Streaming --

/// Per-stream `OpenAI` SSE encoder
///
/// Chat completion chunks have no block boundaries: the assistant role rides
/// on the first chunk that carries content, tool calls are addressed by
/// their position among tool calls rather than by block index, and the
/// stream closes with `[DONE]` after the finish chunk or an error chunk.
#[derive(Debug)]
pub struct OpenAiEncoder {
    meta: ResponseMeta,
    include_usage: bool,
    role_pending: bool,
    tool_slots: HashMap<u32, u32>,
}

impl OpenAiEncoder {
    /// Encoder for one response
    pub fn new(meta: ResponseMeta, include_usage: bool) -> Self {
        Self {
            meta,
            include_usage,
            role_pending: true,
            tool_slots: HashMap::new(),
        }
    }

    /// Frames for one canonical event, in order
    pub fn encode(&mut self, event: &CanonicalEvent) -> Vec<SseFrame> {
        match event {
            CanonicalEvent::MessageStarted { .. }
            | CanonicalEvent::BlockStopped { .. }
            | CanonicalEvent::BlockStarted {
                block: BlockKind::Text, ..
            } => Vec::new(),
            CanonicalEvent::BlockStarted {
                index,
                block: BlockKind::ToolCall { id, name },
            } => {
                let slot = u32::try_from(self.tool_slots.len()).unwrap_or(u32::MAX);
                self.tool_slots.insert(*index, slot);

                vec![self.delta_frame(OpenAiStreamDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![OpenAiStreamToolCall {
                        index: slot,
                        id: Some(id.clone()),
                        tool_type: Some("function".to_owned()),
                        function: Some(OpenAiStreamFunctionCall {
                            name: Some(name.clone()),
                            arguments: Some(String::new()),
                        }),
                    }]),
                })]
            }
            CanonicalEvent::BlockDelta {
                delta: BlockDelta::Text(text),
                ..
            } => vec![self.delta_frame(OpenAiStreamDelta {
                role: None,
                content: Some(text.clone()),
                tool_calls: None,
            })],
            CanonicalEvent::BlockDelta {
                index,
                delta: BlockDelta::ToolArguments(fragment),
            } => {
                let Some(&slot) = self.tool_slots.get(index) else {
                    tracing::debug!(index, "tool arguments for an unknown block");
                    return Vec::new();
                };

                vec![self.delta_frame(OpenAiStreamDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![OpenAiStreamToolCall {
                        index: slot,
                        id: None,
                        tool_type: None,
                        function: Some(OpenAiStreamFunctionCall {
                            name: None,
                            arguments: Some(fragment.clone()),
                        }),
                    }]),
                })]
            }
            CanonicalEvent::MessageStopped { stop_reason, usage } => {
                let mut frames = Vec::with_capacity(3);

                let finish = OpenAiStreamDelta {
                    role: None,
                    content: None,
                    tool_calls: None,
                };
                let mut chunk = self.chunk(finish, Some(finish_reason(*stop_reason)));
                if self.role_pending {
                    self.role_pending = false;
                    chunk.choices[0].delta.role = Some("assistant".to_owned());
                }
                frames.push(SseFrame::data(to_data(&chunk)));

                if self.include_usage {
                    let mut usage_chunk = self.chunk(
                        OpenAiStreamDelta {
                            role: None,
                            content: None,
                            tool_calls: None,
                        },
                        None,
                    );
                    usage_chunk.choices.clear();
                    usage_chunk.usage = Some(usage_to_wire(*usage));
                    frames.push(SseFrame::data(to_data(&usage_chunk)));
                }

                frames.push(SseFrame::done());
                frames
            }
            CanonicalEvent::Error(report) => vec![
                SseFrame::data(to_data(&error_body(report.kind, &report.message))),
                SseFrame::done(),
            ],
        }
    }

    fn delta_frame(&mut self, mut delta: OpenAiStreamDelta) -> SseFrame {
        if self.role_pending {
            self.role_pending = false;
            delta.role = Some("assistant".to_owned());
        }
        SseFrame::data(to_data(&self.chunk(delta, None)))
    }

    fn chunk(&self, delta: OpenAiStreamDelta, finish_reason: Option<&str>) -> OpenAiStreamChunk {
        OpenAiStreamChunk {
            id: self.meta.id.clone(),
            object: "chat.completion.chunk".to_owned(),
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![OpenAiStreamChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_owned),
            }],
            usage: None,
        }
    }
}

// -- Errors --

/// `OpenAI` `error.type` for a kind
pub const fn error_type(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::MalformedRequest | ErrorKind::Unauthorized | ErrorKind::CredentialExpired => {
            "invalid_request_error"
        }
        ErrorKind::RateLimited => "rate_limit_exceeded",
        ErrorKind::RequestTimeout | ErrorKind::AgentTimeout => "timeout",
        ErrorKind::CredentialUnavailable
        | ErrorKind::AgentUnavailable
        | ErrorKind::AgentProtocolError
        | ErrorKind::Internal => "server_error",
    }
}

/// HTTP status for a kind
pub const fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized | ErrorKind::CredentialExpired => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::CredentialUnavailable | ErrorKind::AgentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::AgentProtocolError => StatusCode::BAD_GATEWAY,
        ErrorKind::AgentTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error envelope body
pub fn error_body(kind: ErrorKind, message: &str) -> OpenAiErrorResponse {
    OpenAiErrorResponse {
        error: OpenAiErrorDetail {
            message: message.to_owned(),
            error_type: error_type(kind).to_owned(),
            param: None,
            code: Some(kind.code().to_owned()),
        },
    }
}

fn malformed(message: impl Into<String>) -> GatewayError {
    GatewayError::MalformedRequest(message.into())
}
