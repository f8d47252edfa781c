use std::collections::HashMap;

use serde::Deserialize;

use crate::error::AgentError;
use crate::types::{BlockDelta, BlockKind, CanonicalEvent, StopReason, Usage};

/// One line of the agent's `stream-json` output
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NativeLine {
    StreamEvent {
        event: NativeStreamEvent,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
    },
    Assistant {
        message: NativeMessage,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
    },
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        usage: Option<NativeUsage>,
    },
    /// `system`, `user` and anything newer
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NativeStreamEvent {
    MessageStart {
        message: NativeStartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: NativeBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: NativeDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: NativeMessageDelta,
        #[serde(default)]
        usage: Option<NativeUsage>,
    },
    Error {
        error: NativeErrorBody,
    },
    /// `message_stop`, `ping`
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct NativeStartMessage {
    #[serde(default)]
    usage: NativeUsage,
}

#[derive(Debug, Default, Deserialize)]
struct NativeMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NativeErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NativeBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
    },
    /// Thinking and server-side blocks are not forwarded
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NativeDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct NativeMessage {
    #[serde(default)]
    content: Vec<NativeContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<NativeUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NativeContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct NativeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<NativeUsage> for Usage {
    fn from(usage: NativeUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

/// Incremental translator from agent output lines to canonical events
///
/// The agent may run several internal turns for one request. They are
/// flattened into a single canonical message: block indices continue across
/// turns, and only the final `result` line ends the message.
#[derive(Debug, Default)]
pub struct NativeDecoder {
    started: bool,
    saw_partials: bool,
    next_index: u32,
    turn_blocks: HashMap<u32, Option<u32>>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    finished: bool,
}

impl NativeDecoder {
    /// Decoder for one agent run
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal `result` line has been seen
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Events for one stdout line
    pub fn decode_line(&mut self, line: &str) -> Result<Vec<CanonicalEvent>, AgentError> {
        let line = line.trim();
        if line.is_empty() || self.finished {
            return Ok(Vec::new());
        }

        let parsed: NativeLine = serde_json::from_str(line)
            .map_err(|e| AgentError::Protocol(format!("unparseable agent output: {e}")))?;

        match parsed {
            NativeLine::StreamEvent {
                parent_tool_use_id: Some(_),
                ..
            }
            | NativeLine::Assistant {
                parent_tool_use_id: Some(_),
                ..
            }
            | NativeLine::Other => Ok(Vec::new()),
            NativeLine::StreamEvent { event, .. } => {
                self.saw_partials = true;
                self.stream_event(event)
            }
            NativeLine::Assistant { message, .. } if !self.saw_partials => Ok(self.whole_message(message)),
            NativeLine::Assistant { .. } => Ok(Vec::new()),
            NativeLine::Result {
                is_error,
                subtype,
                result,
                usage,
            } => {
                self.finished = true;
                if is_error {
                    return Err(AgentError::Protocol(format!(
                        "agent run failed ({}): {}",
                        subtype.as_deref().unwrap_or("error"),
                        result.as_deref().unwrap_or("no detail")
                    )));
                }
                Ok(self.finish(result, usage))
            }
        }
    }

    fn stream_event(&mut self, event: NativeStreamEvent) -> Result<Vec<CanonicalEvent>, AgentError> {
        let mut events = Vec::new();

        match event {
            NativeStreamEvent::MessageStart { message } => {
                self.turn_blocks.clear();
                self.ensure_started(&mut events, message.usage.into());
            }
            NativeStreamEvent::ContentBlockStart { index, content_block } => {
                let block = match content_block {
                    NativeBlock::Text => Some(BlockKind::Text),
                    NativeBlock::ToolUse { id, name } => Some(BlockKind::ToolCall { id, name }),
                    NativeBlock::Other => None,
                };
                let Some(block) = block else {
                    self.turn_blocks.insert(index, None);
                    return Ok(events);
                };

                self.ensure_started(&mut events, Usage::default());
                let out = self.next_index;
                self.next_index += 1;
                self.turn_blocks.insert(index, Some(out));
                events.push(CanonicalEvent::BlockStarted { index: out, block });
            }
            NativeStreamEvent::ContentBlockDelta { index, delta } => {
                let Some(out) = self.mapped(index)? else {
                    return Ok(events);
                };
                let delta = match delta {
                    NativeDelta::TextDelta { text } => BlockDelta::Text(text),
                    NativeDelta::InputJsonDelta { partial_json } => BlockDelta::ToolArguments(partial_json),
                    NativeDelta::Other => return Ok(events),
                };
                events.push(CanonicalEvent::BlockDelta { index: out, delta });
            }
            NativeStreamEvent::ContentBlockStop { index } => {
                if let Some(out) = self.mapped(index)? {
                    events.push(CanonicalEvent::BlockStopped { index: out });
                }
            }
            NativeStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(StopReason::from_native(&reason));
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = self.usage.output_tokens.saturating_add(usage.output_tokens);
                }
            }
            NativeStreamEvent::Error { error } => {
                return Err(AgentError::Protocol(format!("agent stream error: {}", error.message)));
            }
            NativeStreamEvent::Other => {}
        }

        Ok(events)
    }

    fn whole_message(&mut self, message: NativeMessage) -> Vec<CanonicalEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events, message.usage.unwrap_or_default().into());

        for content in message.content {
            let (block, delta) = match content {
                NativeContent::Text { text } => (BlockKind::Text, BlockDelta::Text(text)),
                NativeContent::ToolUse { id, name, input } => (
                    BlockKind::ToolCall { id, name },
                    BlockDelta::ToolArguments(input.to_string()),
                ),
                NativeContent::Other => continue,
            };

            let index = self.next_index;
            self.next_index += 1;
            events.extend([
                CanonicalEvent::BlockStarted { index, block },
                CanonicalEvent::BlockDelta { index, delta },
                CanonicalEvent::BlockStopped { index },
            ]);
        }

        if let Some(reason) = message.stop_reason {
            self.stop_reason = Some(StopReason::from_native(&reason));
        }
        if let Some(usage) = message.usage {
            self.usage.output_tokens = self.usage.output_tokens.saturating_add(usage.output_tokens);
        }

        events
    }

    fn finish(&mut self, result: Option<String>, usage: Option<NativeUsage>) -> Vec<CanonicalEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events, Usage::default());

        // Runs that streamed nothing still report their answer here
        if self.next_index == 0
            && let Some(text) = result.filter(|t| !t.is_empty())
        {
            events.extend([
                CanonicalEvent::BlockStarted {
                    index: 0,
                    block: BlockKind::Text,
                },
                CanonicalEvent::BlockDelta {
                    index: 0,
                    delta: BlockDelta::Text(text),
                },
                CanonicalEvent::BlockStopped { index: 0 },
            ]);
            self.next_index = 1;
        }

        let usage = usage.map_or(self.usage, Usage::from);
        events.push(CanonicalEvent::MessageStopped {
            stop_reason: self.stop_reason.unwrap_or_default(),
            usage,
        });
        events
    }

    fn ensure_started(&mut self, events: &mut Vec<CanonicalEvent>, usage: Usage) {
        if !self.started {
            self.started = true;
            self.usage.input_tokens = usage.input_tokens;
            events.push(CanonicalEvent::MessageStarted { usage });
        }
    }

    fn mapped(&self, index: u32) -> Result<Option<u32>, AgentError> {
        self.turn_blocks
            .get(&index)
            .copied()
            .ok_or_else(|| AgentError::Protocol(format!("agent referenced unopened block {index}")))
    }
}
