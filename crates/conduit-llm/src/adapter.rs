//! Dialect dispatch over the two client-facing wire formats

use std::fmt;

use conduit_core::ErrorKind;
use http::StatusCode;
use serde_json::Value;

use crate::convert::{DecodeOptions, ResponseMeta, anthropic, openai};
use crate::error::GatewayError;
use crate::types::{CanonicalEvent, CanonicalRequest, CanonicalResponse};

/// Client-facing API dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Dialect {
    /// Anthropic Messages API
    Anthropic,
    /// `OpenAI` Chat Completions API
    #[strum(serialize = "openai")]
    OpenAi,
}

/// A decoded client request
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Canonical form of the request
    pub request: CanonicalRequest,
    /// Whether the stream should end with a usage chunk
    pub include_usage: bool,
}

impl Dialect {
    /// Dialect that owns a request path; `/v1/models` and unknown paths use `OpenAI`
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/v1/messages") {
            Self::Anthropic
        } else {
            Self::OpenAi
        }
    }

    /// Decode and validate a request body
    pub fn decode(self, body: &[u8], options: DecodeOptions<'_>) -> Result<Decoded, GatewayError> {
        match self {
            Self::Anthropic => anthropic::decode(body, options).map(|request| Decoded {
                request,
                include_usage: false,
            }),
            Self::OpenAi => openai::decode(body, options),
        }
    }

    /// Fresh identity for one response
    pub fn response_meta(self, model: &str) -> ResponseMeta {
        let id = uuid::Uuid::new_v4().simple();
        ResponseMeta {
            id: match self {
                Self::Anthropic => format!("msg_{id}"),
                Self::OpenAi => format!("chatcmpl-{id}"),
            },
            model: model.to_owned(),
            created: u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or_default(),
        }
    }

    /// Serialize a complete response as the terminal body
    pub fn encode_terminal(self, response: &CanonicalResponse, meta: &ResponseMeta) -> Result<Vec<u8>, GatewayError> {
        let body = match self {
            Self::Anthropic => serde_json::to_vec(&anthropic::encode_response(response, meta)),
            Self::OpenAi => serde_json::to_vec(&openai::encode_response(response, meta)),
        };
        body.map_err(|e| GatewayError::Internal(e.into()))
    }

    /// Stream encoder for one response
    pub fn stream_encoder(self, meta: ResponseMeta, include_usage: bool) -> StreamEncoder {
        match self {
            Self::Anthropic => StreamEncoder::Anthropic(anthropic::AnthropicEncoder::new(meta)),
            Self::OpenAi => StreamEncoder::OpenAi(openai::OpenAiEncoder::new(meta, include_usage)),
        }
    }

    /// HTTP status for an error kind
    pub fn error_status(self, kind: ErrorKind) -> StatusCode {
        match self {
            Self::Anthropic => anthropic::error_status(kind),
            Self::OpenAi => openai::error_status(kind),
        }
    }

    /// Error envelope for an error kind
    pub fn error_body(self, kind: ErrorKind, message: &str) -> Value {
        let body = match self {
            Self::Anthropic => serde_json::to_value(anthropic::error_body(kind, message)),
            Self::OpenAi => serde_json::to_value(openai::error_body(kind, message)),
        };
        body.unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize error envelope");
            serde_json::json!({ "error": { "message": message, "code": kind.code() } })
        })
    }
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, when the dialect uses them
    pub event: Option<&'static str>,
    /// Event payload
    pub data: String,
}

impl SseFrame {
    /// Named event
    pub const fn named(event: &'static str, data: String) -> Self {
        Self {
            event: Some(event),
            data,
        }
    }

    /// Unnamed event
    pub const fn data(data: String) -> Self {
        Self { event: None, data }
    }

    /// `OpenAI` stream terminator
    pub fn done() -> Self {
        Self::data("[DONE]".to_owned())
    }

    /// Whether this is the `OpenAI` stream terminator
    pub fn is_done(&self) -> bool {
        self.event.is_none() && self.data == "[DONE]"
    }
}

impl fmt::Display for SseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(event) = self.event {
            writeln!(f, "event: {event}")?;
        }
        write!(f, "data: {}", self.data)
    }
}

/// Per-response stream encoder for either dialect
#[derive(Debug)]
pub enum StreamEncoder {
    /// Anthropic named events
    Anthropic(anthropic::AnthropicEncoder),
    /// `OpenAI` chunks
    OpenAi(openai::OpenAiEncoder),
}

impl StreamEncoder {
    /// Frames for one canonical event
    pub fn encode(&mut self, event: &CanonicalEvent) -> Vec<SseFrame> {
        match self {
            Self::Anthropic(encoder) => encoder.encode(event),
            Self::OpenAi(encoder) => encoder.encode(event),
        }
    }
}

/// Re-encode a canonical request in `dialect`'s wire format
///
/// Used to check that decoding is lossless; the gateway itself never sends
/// client dialects upstream.
pub fn encode_request(
    dialect: Dialect,
    request: &CanonicalRequest,
    default_max_tokens: u32,
) -> Result<Vec<u8>, GatewayError> {
    let body = match dialect {
        Dialect::Anthropic => serde_json::to_vec(&anthropic::encode_request(request, default_max_tokens)),
        Dialect::OpenAi => serde_json::to_vec(&openai::encode_request(request)),
    };
    body.map_err(|e| GatewayError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use conduit_config::LlmConfig;
    use indoc::indoc;

    use super::*;
    use crate::types::{ContentBlock, Role};

    fn decode(dialect: Dialect, body: &[u8]) -> CanonicalRequest {
        let llm = LlmConfig::default();
        dialect
            .decode(
                body,
                DecodeOptions {
                    llm: &llm,
                    sandbox_root: None,
                },
            )
            .unwrap()
            .request
    }

    fn round_trip(dialect: Dialect, body: &str) -> (CanonicalRequest, CanonicalRequest) {
        let first = decode(dialect, body.as_bytes());
        let wire = encode_request(dialect, &first, 4096).unwrap();
        let second = decode(dialect, &wire);
        (first, second)
    }

    #[test]
    fn dialect_for_path() {
        assert_eq!(Dialect::for_path("/v1/messages"), Dialect::Anthropic);
        assert_eq!(Dialect::for_path("/v1/chat/completions"), Dialect::OpenAi);
        assert_eq!(Dialect::for_path("/v1/models"), Dialect::OpenAi);
        assert_eq!(Dialect::OpenAi.to_string(), "openai");
        assert_eq!(Dialect::Anthropic.as_ref(), "anthropic");
    }

    #[test]
    fn anthropic_round_trip_keeps_tool_calls_in_order() {
        let (first, second) = round_trip(
            Dialect::Anthropic,
            indoc! {r#"
                {
                  "model": "claude-sonnet-4-20250514",
                  "max_tokens": 512,
                  "system": "You are terse.",
                  "tools": [{"name": "get_weather", "description": "Weather", "input_schema": {"type": "object"}}],
                  "messages": [
                    {"role": "user", "content": "Paris and Oslo?"},
                    {"role": "assistant", "content": [
                      {"type": "text", "text": "Checking both."},
                      {"type": "tool_use", "id": "toolu_a", "name": "get_weather", "input": {"city": "Paris"}},
                      {"type": "tool_use", "id": "toolu_b", "name": "get_weather", "input": {"city":"Oslo","limit":1.0e2}}
                    ]},
                    {"role": "user", "content": [
                      {"type": "tool_result", "tool_use_id": "toolu_a", "content": "sunny"},
                      {"type": "tool_result", "tool_use_id": "toolu_b", "content": "snow", "is_error": true}
                    ]}
                  ]
                }
            "#},
        );

        assert_eq!(first, second);
        let calls: Vec<_> = second.messages[2].tool_calls().collect();
        assert_eq!(
            calls,
            vec![
                ("toolu_a", "get_weather", r#"{"city": "Paris"}"#),
                ("toolu_b", "get_weather", r#"{"city":"Oslo","limit":1.0e2}"#),
            ]
        );
    }

    #[test]
    fn openai_round_trip_keeps_arguments_byte_for_byte() {
        let (first, second) = round_trip(
            Dialect::OpenAi,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "Paris and Oslo?"},
                    {"role": "assistant", "content": null, "tool_calls": [
                      {"id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\": \"Paris\"}"}},
                      {"id": "call_b", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_a", "content": "sunny"},
                    {"role": "tool", "tool_call_id": "call_b", "content": "snow"}
                  ],
                  "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object"}}}],
                  "tool_choice": "required",
                  "parallel_tool_calls": false
                }
            "#},
        );

        assert_eq!(first, second);
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[3].role, Role::Tool);
        assert!(matches!(
            &second.messages[2].content[0],
            ContentBlock::ToolCall { arguments, .. } if arguments == r#"{"city": "Paris"}"#
        ));
    }

    #[test]
    fn openai_arguments_survive_an_anthropic_hop() {
        let first = decode(
            Dialect::OpenAi,
            indoc! {r#"
                {
                  "model": "gpt-4o",
                  "messages": [
                    {"role": "user", "content": "Paris?"},
                    {"role": "assistant", "content": null, "tool_calls": [
                      {"id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\": \"Paris\",  \"days\": 2.50}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_a", "content": "sunny"}
                  ]
                }
            "#}
            .as_bytes(),
        );

        let wire = encode_request(Dialect::Anthropic, &first, 4096).unwrap();
        let second = decode(Dialect::Anthropic, &wire);

        assert_eq!(
            second.messages[1].tool_calls().next(),
            Some(("call_a", "get_weather", r#"{"city": "Paris",  "days": 2.50}"#))
        );
    }

    #[test]
    fn error_envelopes_differ_by_dialect() {
        let anthropic = Dialect::Anthropic.error_body(ErrorKind::RateLimited, "slow down");
        assert_eq!(anthropic["type"], "error");
        assert_eq!(anthropic["error"]["type"], "rate_limit_error");
        assert_eq!(anthropic["error"]["code"], "rate_limited");

        let openai = Dialect::OpenAi.error_body(ErrorKind::RateLimited, "slow down");
        assert_eq!(openai["error"]["type"], "rate_limit_exceeded");
        assert_eq!(openai["error"]["message"], "slow down");
    }

    #[test]
    fn response_ids_follow_dialect_conventions() {
        assert!(Dialect::Anthropic.response_meta("m").id.starts_with("msg_"));
        let meta = Dialect::OpenAi.response_meta("gpt-4o");
        assert!(meta.id.starts_with("chatcmpl-"));
        assert_eq!(meta.model, "gpt-4o");
        assert!(meta.created > 0);
    }

    #[test]
    fn frame_rendering() {
        assert_eq!(SseFrame::named("ping", "{}".to_owned()).to_string(), "event: ping\ndata: {}");
        assert_eq!(SseFrame::done().to_string(), "data: [DONE]");
        assert!(SseFrame::done().is_done());
    }
}
