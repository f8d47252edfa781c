//! Conversion between canonical types and the Anthropic Messages dialect

use conduit_core::ErrorKind;
use http::StatusCode;
use serde_json::value::RawValue;

use super::{DecodeOptions, ResponseMeta, parse_body, sandboxed_cwd, to_data};
use crate::adapter::SseFrame;
use crate::error::GatewayError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicErrorDetail, AnthropicErrorResponse, AnthropicImageSource,
    AnthropicMessage, AnthropicMessageDelta, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock,
    AnthropicRole, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicStreamMessage,
    AnthropicSystem, AnthropicThinking, AnthropicTool, AnthropicToolChoice, AnthropicToolResultBlock,
    AnthropicToolResultContent, AnthropicUsage,
};
use crate::types::{
    AgentOptions, BlockDelta, BlockKind, CanonicalEvent, CanonicalRequest, CanonicalResponse, ContentBlock,
    GenerationParams, MediaSource, Message, Role, StopReason, Tool, ToolChoice, Usage, push_message,
};

// -- Inbound: Anthropic wire format -> canonical --

/// Decode and validate a `POST /v1/messages` body
pub fn decode(body: &[u8], options: DecodeOptions<'_>) -> Result<CanonicalRequest, GatewayError> {
    let wire: AnthropicRequest = parse_body(body)?;
    let request = request_from_wire(wire, options)?;
    request.validate().map_err(GatewayError::MalformedRequest)?;
    Ok(request)
}

fn request_from_wire(req: AnthropicRequest, options: DecodeOptions<'_>) -> Result<CanonicalRequest, GatewayError> {
    if req.messages.is_empty() {
        return Err(malformed("messages: at least one message is required"));
    }
    if req.max_tokens == 0 {
        return Err(malformed("max_tokens: must be greater than 0"));
    }

    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    match req.system {
        Some(AnthropicSystem::Text(text)) if !text.is_empty() => messages.push(Message::text(Role::System, text)),
        Some(AnthropicSystem::Blocks(blocks)) if !blocks.is_empty() => messages.push(Message {
            role: Role::System,
            content: blocks
                .into_iter()
                .map(|block| ContentBlock::Text { text: block.text })
                .collect(),
        }),
        _ => {}
    }

    for (position, message) in req.messages.into_iter().enumerate() {
        for message in message_from_wire(position, message)? {
            push_message(&mut messages, message);
        }
    }

    let (tool_choice, parallel_tool_calls) = match req.tool_choice {
        Some(choice) => tool_choice_from_wire(choice)?,
        None => (None, true),
    };

    let thinking_budget = match req.thinking {
        Some(AnthropicThinking {
            thinking_type,
            budget_tokens,
        }) => match thinking_type.as_str() {
            "enabled" => Some(budget_tokens.ok_or_else(|| malformed("thinking.budget_tokens: field required"))?),
            "disabled" => None,
            other => return Err(malformed(format!("thinking.type: unsupported value `{other}`"))),
        },
        None => None,
    }
    .or(req.max_thinking_tokens);

    let cwd = req
        .cwd
        .as_deref()
        .map(|cwd| sandboxed_cwd(options.sandbox_root, cwd))
        .transpose()?;

    Ok(CanonicalRequest {
        model: req.model,
        messages,
        tools: req
            .tools
            .unwrap_or_default()
            .into_iter()
            .map(|tool| Tool {
                name: tool.name,
                description: tool.description,
                parameters: tool.input_schema,
            })
            .collect(),
        tool_choice,
        parallel_tool_calls,
        params: GenerationParams {
            max_tokens: Some(req.max_tokens),
            temperature: req.temperature.or(options.llm.default_temperature),
            stop_sequences: req.stop_sequences.unwrap_or_default(),
        },
        stream: req.stream.unwrap_or(false),
        agent: AgentOptions {
            thinking_budget,
            max_turns: req.max_turns,
            allowed_tools: req.allowed_tools,
            permission_mode: req.permission_mode,
            cwd,
        },
    })
}

/// Split one wire message into canonical messages
///
/// A user message carrying `tool_result` blocks becomes a tool message for
/// those blocks, followed by a user message for the rest.
fn message_from_wire(position: usize, msg: AnthropicMessage) -> Result<Vec<Message>, GatewayError> {
    let role = match msg.role {
        AnthropicRole::User => Role::User,
        AnthropicRole::Assistant => Role::Assistant,
    };

    let blocks = match msg.content {
        AnthropicContent::Text(text) => return Ok(vec![Message::text(role, text)]),
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut out: Vec<Message> = Vec::new();
    let mut push = |block_role: Role, block: ContentBlock| match out.last_mut() {
        Some(last) if last.role == block_role => last.content.push(block),
        _ => out.push(Message {
            role: block_role,
            content: vec![block],
        }),
    };

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => push(role, ContentBlock::Text { text }),
            AnthropicContentBlock::Image { source } => push(
                role,
                ContentBlock::Image {
                    source: media_from_wire(source),
                },
            ),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                if role != Role::Assistant {
                    return Err(malformed(format!(
                        "messages.{position}: tool_use blocks are only valid in assistant messages"
                    )));
                }
                push(
                    role,
                    ContentBlock::ToolCall {
                        id,
                        name,
                        arguments: input.get().to_owned(),
                    },
                );
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if role != Role::User {
                    return Err(malformed(format!(
                        "messages.{position}: tool_result blocks are only valid in user messages"
                    )));
                }
                push(
                    Role::Tool,
                    ContentBlock::ToolResult {
                        call_id: tool_use_id,
                        content: tool_result_text(content),
                        is_error: is_error.unwrap_or(false),
                    },
                );
            }
            AnthropicContentBlock::Thinking { .. } | AnthropicContentBlock::RedactedThinking { .. } => {}
        }
    }

    if out.is_empty() {
        out.push(Message {
            role,
            content: Vec::new(),
        });
    }

    Ok(out)
}

fn tool_result_text(content: Option<AnthropicToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(AnthropicToolResultContent::Text(text)) => text,
        Some(AnthropicToolResultContent::Blocks(blocks)) => blocks
            .into_iter()
            .filter_map(|block| match block {
                AnthropicToolResultBlock::Text { text } => Some(text),
                AnthropicToolResultBlock::Image { .. } => {
                    tracing::debug!("dropping image inside tool_result");
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn tool_choice_from_wire(choice: AnthropicToolChoice) -> Result<(Option<ToolChoice>, bool), GatewayError> {
    let parallel = !choice.disable_parallel_tool_use.unwrap_or(false);

    let choice = match choice.choice_type.as_str() {
        "auto" => ToolChoice::Auto,
        "any" => ToolChoice::Any,
        "none" => ToolChoice::None,
        "tool" => ToolChoice::Tool {
            name: choice
                .name
                .ok_or_else(|| malformed("tool_choice.name: required when type is `tool`"))?,
        },
        other => return Err(malformed(format!("tool_choice.type: unsupported value `{other}`"))),
    };

    Ok((Some(choice), parallel))
}

fn media_from_wire(source: AnthropicImageSource) -> MediaSource {
    match source {
        AnthropicImageSource::Base64 { media_type, data } => MediaSource::Base64 { media_type, data },
        AnthropicImageSource::Url { url } => MediaSource::Url { url },
    }
}

// -- Outbound: canonical -> Anthropic wire format --

/// Encode a canonical request as an Anthropic request body
///
/// `default_max_tokens` fills the field the dialect requires.
pub fn encode_request(req: &CanonicalRequest, default_max_tokens: u32) -> AnthropicRequest {
    let messages = req
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| AnthropicMessage {
            role: if m.role == Role::Assistant {
                AnthropicRole::Assistant
            } else {
                AnthropicRole::User
            },
            content: AnthropicContent::Blocks(m.content.iter().map(block_to_wire).collect()),
        })
        .collect();

    let tool_choice = match (&req.tool_choice, req.parallel_tool_calls) {
        (None, true) => None,
        (choice, parallel) => Some(tool_choice_to_wire(choice.as_ref(), parallel)),
    };

    AnthropicRequest {
        model: req.model.clone(),
        max_tokens: req.params.max_tokens.unwrap_or(default_max_tokens),
        system: req.system_prompt().map(AnthropicSystem::Text),
        messages,
        temperature: req.params.temperature,
        top_p: None,
        top_k: None,
        stop_sequences: (!req.params.stop_sequences.is_empty()).then(|| req.params.stop_sequences.clone()),
        stream: req.stream.then_some(true),
        tools: (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect()
        }),
        tool_choice,
        thinking: req.agent.thinking_budget.map(|budget| AnthropicThinking {
            thinking_type: "enabled".to_owned(),
            budget_tokens: Some(budget),
        }),
        metadata: None,
        service_tier: None,
        max_thinking_tokens: None,
        max_turns: req.agent.max_turns,
        allowed_tools: req.agent.allowed_tools.clone(),
        permission_mode: req.agent.permission_mode.clone(),
        cwd: req.agent.cwd.as_ref().map(|cwd| cwd.display().to_string()),
    }
}

fn block_to_wire(block: &ContentBlock) -> AnthropicContentBlock {
    match block {
        ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentBlock::ToolCall { id, name, arguments } => AnthropicContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: arguments_input(arguments),
        },
        ContentBlock::ToolResult {
            call_id,
            content,
            is_error,
        } => AnthropicContentBlock::ToolResult {
            tool_use_id: call_id.clone(),
            content: Some(AnthropicToolResultContent::Text(content.clone())),
            is_error: is_error.then_some(true),
        },
        ContentBlock::Image { source } => AnthropicContentBlock::Image {
            source: match source.clone() {
                MediaSource::Base64 { media_type, data } => AnthropicImageSource::Base64 { media_type, data },
                MediaSource::Url { url } => AnthropicImageSource::Url { url },
            },
        },
    }
}

fn tool_choice_to_wire(choice: Option<&ToolChoice>, parallel: bool) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        None | Some(ToolChoice::Auto) => ("auto", None),
        Some(ToolChoice::Any) => ("any", None),
        Some(ToolChoice::None) => ("none", None),
        Some(ToolChoice::Tool { name }) => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
        disable_parallel_tool_use: (!parallel).then_some(true),
    }
}

/// Carry tool arguments as the dialect's `input` without reformatting them
///
/// Arguments that are not JSON are carried as a JSON string rather than dropped.
fn arguments_input(arguments: &str) -> Box<RawValue> {
    let arguments = arguments.trim();
    if arguments.is_empty() {
        return empty_input();
    }

    RawValue::from_string(arguments.to_owned())
        .or_else(|_| serde_json::value::to_raw_value(arguments))
        .unwrap_or_else(|_| empty_input())
}

fn empty_input() -> Box<RawValue> {
    RawValue::from_string("{}".to_owned()).unwrap_or_else(|_| RawValue::NULL.to_owned())
}

/// Encode a complete response as the terminal body
pub fn encode_response(response: &CanonicalResponse, meta: &ResponseMeta) -> AnthropicResponse {
    AnthropicResponse {
        id: meta.id.clone(),
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        content: response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(AnthropicResponseBlock::Text { text: text.clone() }),
                ContentBlock::ToolCall { id, name, arguments } => Some(AnthropicResponseBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: arguments_input(arguments),
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => None,
            })
            .collect(),
        model: meta.model.clone(),
        stop_reason: Some(stop_reason_str(response.stop_reason).to_owned()),
        stop_sequence: None,
        usage: usage_to_wire(response.usage),
    }
}

/// Anthropic name of a stop reason
pub const fn stop_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "end_turn",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::ToolUse => "tool_use",
        StopReason::Refusal => "refusal",
    }
}

const fn usage_to_wire(usage: Usage) -> AnthropicUsage {
    AnthropicUsage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
    }
}

// -- Streaming --

/// Per-stream Anthropic SSE encoder
///
/// Canonical events map almost one-to-one onto named Anthropic events;
/// `MessageStopped` expands into `message_delta` plus `message_stop`.
#[derive(Debug)]
pub struct AnthropicEncoder {
    meta: ResponseMeta,
}

impl AnthropicEncoder {
    /// Encoder for one response
    pub const fn new(meta: ResponseMeta) -> Self {
        Self { meta }
    }

    /// Frames for one canonical event, in order
    pub fn encode(&mut self, event: &CanonicalEvent) -> Vec<SseFrame> {
        let events = match event {
            CanonicalEvent::MessageStarted { usage } => vec![AnthropicStreamEvent::MessageStart {
                message: AnthropicStreamMessage {
                    id: self.meta.id.clone(),
                    message_type: "message".to_owned(),
                    role: "assistant".to_owned(),
                    content: Vec::new(),
                    model: self.meta.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: usage_to_wire(*usage),
                },
            }],
            CanonicalEvent::BlockStarted { index, block } => vec![AnthropicStreamEvent::ContentBlockStart {
                index: *index,
                content_block: match block {
                    BlockKind::Text => AnthropicStreamContentBlock::Text { text: String::new() },
                    BlockKind::ToolCall { id, name } => AnthropicStreamContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: serde_json::Value::Object(serde_json::Map::new()),
                    },
                },
            }],
            CanonicalEvent::BlockDelta { index, delta } => vec![AnthropicStreamEvent::ContentBlockDelta {
                index: *index,
                delta: match delta {
                    BlockDelta::Text(text) => AnthropicStreamDelta::TextDelta { text: text.clone() },
                    BlockDelta::ToolArguments(json) => AnthropicStreamDelta::InputJsonDelta {
                        partial_json: json.clone(),
                    },
                },
            }],
            CanonicalEvent::BlockStopped { index } => vec![AnthropicStreamEvent::ContentBlockStop { index: *index }],
            CanonicalEvent::MessageStopped { stop_reason, usage } => vec![
                AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta {
                        stop_reason: Some(stop_reason_str(*stop_reason).to_owned()),
                        stop_sequence: None,
                    },
                    usage: Some(usage_to_wire(*usage)),
                },
                AnthropicStreamEvent::MessageStop,
            ],
            CanonicalEvent::Error(report) => vec![AnthropicStreamEvent::Error {
                error: error_detail(report.kind, &report.message),
            }],
        };

        events
            .into_iter()
            .map(|event| SseFrame::named(event.event_name(), to_data(&event)))
            .collect()
    }
}

// -- Errors --

/// Anthropic `error.type` for a kind
pub const fn error_type(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::MalformedRequest => "invalid_request_error",
        ErrorKind::Unauthorized | ErrorKind::CredentialExpired => "authentication_error",
        ErrorKind::RateLimited => "rate_limit_error",
        ErrorKind::RequestTimeout => "timeout_error",
        ErrorKind::AgentUnavailable | ErrorKind::AgentTimeout => "overloaded_error",
        ErrorKind::CredentialUnavailable | ErrorKind::AgentProtocolError | ErrorKind::Internal => "api_error",
    }
}

/// HTTP status for a kind
pub fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized | ErrorKind::CredentialExpired => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::CredentialUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::AgentUnavailable | ErrorKind::AgentTimeout => {
            StatusCode::from_u16(529).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        }
        ErrorKind::AgentProtocolError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_detail(kind: ErrorKind, message: &str) -> AnthropicErrorDetail {
    AnthropicErrorDetail {
        error_type: error_type(kind).to_owned(),
        message: message.to_owned(),
        code: Some(kind.code().to_owned()),
    }
}

/// Error envelope body
pub fn error_body(kind: ErrorKind, message: &str) -> AnthropicErrorResponse {
    AnthropicErrorResponse {
        response_type: "error".to_owned(),
        error: error_detail(kind, message),
    }
}

fn malformed(message: impl Into<String>) -> GatewayError {
    GatewayError::MalformedRequest(message.into())
}
