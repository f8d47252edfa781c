use std::collections::BTreeMap;

use crate::types::{BlockDelta, BlockKind, CanonicalEvent, CanonicalResponse, ContentBlock, ErrorReport, StopReason, Usage};

/// Folds a canonical event stream into one complete response
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    blocks: BTreeMap<u32, ContentBlock>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

impl ResponseAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event; a terminal error is returned as-is
    pub fn push(&mut self, event: CanonicalEvent) -> Result<(), ErrorReport> {
        match event {
            CanonicalEvent::MessageStarted { usage } => self.usage = usage,
            CanonicalEvent::BlockStarted { index, block } => {
                let block = match block {
                    BlockKind::Text => ContentBlock::Text { text: String::new() },
                    BlockKind::ToolCall { id, name } => ContentBlock::ToolCall {
                        id,
                        name,
                        arguments: String::new(),
                    },
                };
                self.blocks.insert(index, block);
            }
            CanonicalEvent::BlockDelta { index, delta } => match (self.blocks.get_mut(&index), delta) {
                (Some(ContentBlock::Text { text }), BlockDelta::Text(fragment)) => text.push_str(&fragment),
                (Some(ContentBlock::ToolCall { arguments, .. }), BlockDelta::ToolArguments(fragment)) => {
                    arguments.push_str(&fragment);
                }
                (_, delta) => tracing::debug!(index, ?delta, "delta does not match an open block"),
            },
            CanonicalEvent::BlockStopped { .. } => {}
            CanonicalEvent::MessageStopped { stop_reason, usage } => {
                self.stop_reason = Some(stop_reason);
                self.usage = usage;
            }
            CanonicalEvent::Error(report) => return Err(report),
        }
        Ok(())
    }

    /// Whether a terminal `MessageStopped` has been folded in
    pub const fn is_complete(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// The assembled response
    ///
    /// Tool calls that streamed no arguments get `{}`.
    pub fn finish(self) -> CanonicalResponse {
        let content = self
            .blocks
            .into_values()
            .map(|block| match block {
                ContentBlock::ToolCall { id, name, arguments } if arguments.trim().is_empty() => {
                    ContentBlock::ToolCall {
                        id,
                        name,
                        arguments: "{}".to_owned(),
                    }
                }
                other => other,
            })
            .collect();

        CanonicalResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or_default(),
            usage: self.usage,
        }
    }
}
