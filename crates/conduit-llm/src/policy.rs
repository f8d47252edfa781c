//! Enforcement of a client's "one tool call per turn" request

use std::collections::HashSet;

use conduit_config::ToolCallPolicy;
use conduit_core::ErrorKind;

use crate::types::{BlockKind, CanonicalEvent};

/// Stream stage that holds the agent to a single tool call
///
/// Under [`ToolCallPolicy::Lenient`] every tool call after the first is
/// dropped along with its deltas, and later blocks are renumbered so indices
/// stay contiguous. Under [`ToolCallPolicy::Strict`] the second tool call
/// ends the stream with an `agent_protocol_error`.
#[derive(Debug)]
pub struct ToolCallFilter {
    policy: ToolCallPolicy,
    seen_tool_call: bool,
    dropped: HashSet<u32>,
    failed: bool,
}

impl ToolCallFilter {
    /// Filter for a request; `None` when the client accepts parallel calls
    pub fn for_request(policy: ToolCallPolicy, parallel_tool_calls: bool) -> Option<Self> {
        (!parallel_tool_calls).then(|| Self {
            policy,
            seen_tool_call: false,
            dropped: HashSet::new(),
            failed: false,
        })
    }

    /// Pass one event through, yielding zero or one event
    pub fn apply(&mut self, event: CanonicalEvent) -> Option<CanonicalEvent> {
        if self.failed {
            return None;
        }

        match event {
            CanonicalEvent::BlockStarted { index, block } => {
                if matches!(block, BlockKind::ToolCall { .. }) {
                    if self.seen_tool_call {
                        return self.reject(index);
                    }
                    self.seen_tool_call = true;
                }
                Some(CanonicalEvent::BlockStarted {
                    index: self.repack(index),
                    block,
                })
            }
            CanonicalEvent::BlockDelta { index, delta } => (!self.dropped.contains(&index))
                .then(|| CanonicalEvent::BlockDelta {
                    index: self.repack(index),
                    delta,
                }),
            CanonicalEvent::BlockStopped { index } => (!self.dropped.contains(&index)).then(|| {
                CanonicalEvent::BlockStopped {
                    index: self.repack(index),
                }
            }),
            other => Some(other),
        }
    }

    fn reject(&mut self, index: u32) -> Option<CanonicalEvent> {
        match self.policy {
            ToolCallPolicy::Lenient => {
                tracing::debug!(index, "dropping extra tool call");
                self.dropped.insert(index);
                None
            }
            ToolCallPolicy::Strict => {
                tracing::debug!(index, "agent made more than one tool call");
                self.failed = true;
                Some(CanonicalEvent::error(
                    ErrorKind::AgentProtocolError,
                    "the backend agent made more than one tool call, which this request does not allow",
                ))
            }
        }
    }

    fn repack(&self, index: u32) -> u32 {
        let below = self.dropped.iter().filter(|&&dropped| dropped < index).count();
        index - u32::try_from(below).unwrap_or(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockDelta, StopReason, Usage};

    fn tool_turn() -> Vec<CanonicalEvent> {
        let mut events = vec![CanonicalEvent::MessageStarted { usage: Usage::default() }];
        for (index, id) in [(0, "toolu_a"), (1, "toolu_b")] {
            events.extend([
                CanonicalEvent::BlockStarted {
                    index,
                    block: BlockKind::ToolCall {
                        id: id.to_owned(),
                        name: "lookup".to_owned(),
                    },
                },
                CanonicalEvent::BlockDelta {
                    index,
                    delta: BlockDelta::ToolArguments("{}".to_owned()),
                },
                CanonicalEvent::BlockStopped { index },
            ]);
        }
        events.extend([
            CanonicalEvent::BlockStarted {
                index: 2,
                block: BlockKind::Text,
            },
            CanonicalEvent::BlockStopped { index: 2 },
            CanonicalEvent::MessageStopped {
                stop_reason: StopReason::ToolUse,
                usage: Usage::default(),
            },
        ]);
        events
    }

    fn run(filter: &mut ToolCallFilter, events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
        events.into_iter().filter_map(|event| filter.apply(event)).collect()
    }

    #[test]
    fn inactive_when_parallel_calls_allowed() {
        assert!(ToolCallFilter::for_request(ToolCallPolicy::Strict, true).is_none());
    }

    #[test]
    fn lenient_keeps_first_call_and_repacks() {
        let mut filter = ToolCallFilter::for_request(ToolCallPolicy::Lenient, false).unwrap();
        let out = run(&mut filter, tool_turn());

        assert_eq!(out.len(), 7);
        assert!(matches!(
            &out[1],
            CanonicalEvent::BlockStarted { index: 0, block: BlockKind::ToolCall { id, .. } } if id == "toolu_a"
        ));
        assert_eq!(
            out[4],
            CanonicalEvent::BlockStarted {
                index: 1,
                block: BlockKind::Text
            }
        );
        assert_eq!(out[5], CanonicalEvent::BlockStopped { index: 1 });
        assert!(out[6].is_terminal());
    }

    #[test]
    fn strict_fails_on_second_call() {
        let mut filter = ToolCallFilter::for_request(ToolCallPolicy::Strict, false).unwrap();
        let out = run(&mut filter, tool_turn());

        assert_eq!(out.len(), 5);
        let CanonicalEvent::Error(report) = &out[4] else {
            panic!("expected an error event, got {:?}", out[4]);
        };
        assert_eq!(report.kind, ErrorKind::AgentProtocolError);
    }
}
