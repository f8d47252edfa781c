//! Streaming relay from a dispatched generation to the client
//!
//! A relay owns the upstream [`EventStream`] for one request. It filters and
//! validates every event, enforces the request deadline, and moves through
//! `Idle -> Open -> Draining -> Closed`. Dropping it before `Closed` cancels
//! the generation.

use std::collections::HashSet;
use std::pin::Pin;

use conduit_core::ErrorKind;
use conduit_ratelimit::RequestDeadline;
use futures_util::{Stream, StreamExt};
use tokio::time::Sleep;

use crate::accumulate::ResponseAccumulator;
use crate::adapter::{SseFrame, StreamEncoder};
use crate::backend::EventStream;
use crate::error::GatewayError;
use crate::policy::ToolCallFilter;
use crate::types::{CanonicalEvent, CanonicalResponse, ErrorReport};

/// Lifecycle of one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RelayState {
    /// Waiting for the first event
    Idle,
    /// Forwarding events
    Open,
    /// Terminal event emitted, nothing more will be forwarded
    Draining,
    /// Upstream released
    Closed,
}

/// Per-request relay
pub struct Relay {
    upstream: Option<EventStream>,
    filter: Option<ToolCallFilter>,
    order: OrderCheck,
    deadline: RequestDeadline,
    timer: Pin<Box<Sleep>>,
    state: RelayState,
    request_id: String,
}

impl Relay {
    /// Relay for `upstream`, bounded by `deadline`
    pub fn new(upstream: EventStream, deadline: RequestDeadline) -> Self {
        Self {
            upstream: Some(upstream),
            filter: None,
            order: OrderCheck::default(),
            timer: Box::pin(tokio::time::sleep_until(deadline.instant())),
            deadline,
            state: RelayState::Idle,
            request_id: String::new(),
        }
    }

    /// Apply a tool call filter before validation
    #[must_use]
    pub fn with_filter(mut self, filter: Option<ToolCallFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Identifier used in log lines
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Current state
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Next event to forward, or `None` once the relay has closed
    pub async fn next_event(&mut self) -> Option<CanonicalEvent> {
        loop {
            match self.state {
                RelayState::Closed => return None,
                RelayState::Draining => {
                    self.close();
                    return None;
                }
                RelayState::Idle | RelayState::Open => {}
            }

            let upstream = self.upstream.as_mut()?;
            let received = tokio::select! {
                biased;
                () = &mut self.timer => {
                    tracing::debug!(request_id = %self.request_id, "request deadline reached");
                    let timeout = GatewayError::RequestTimeout(self.deadline.timeout());
                    CanonicalEvent::Error(ErrorReport::from_error(&timeout))
                }
                event = upstream.next() => event.unwrap_or_else(|| {
                    CanonicalEvent::error(ErrorKind::AgentProtocolError, "the backend agent ended the response early")
                }),
            };

            let event = match self.filter.as_mut() {
                Some(filter) => match filter.apply(received) {
                    Some(event) => event,
                    None => continue,
                },
                None => received,
            };

            let event = match self.order.check(&event) {
                Ok(()) => event,
                Err(violation) => {
                    tracing::warn!(request_id = %self.request_id, %violation, "agent event out of order");
                    CanonicalEvent::error(
                        ErrorKind::AgentProtocolError,
                        "the backend agent returned an unexpected response",
                    )
                }
            };

            if self.state == RelayState::Idle {
                self.transition(RelayState::Open);
            }
            if event.is_terminal() {
                self.transition(RelayState::Draining);
                // Nothing after a terminal event is forwarded
                self.upstream = None;
            }
            return Some(event);
        }
    }

    /// Encoded frames, in event order
    pub fn into_frames(self, encoder: StreamEncoder) -> impl Stream<Item = SseFrame> + Send + 'static {
        futures_util::stream::unfold((self, encoder), |(mut relay, mut encoder)| async move {
            let event = relay.next_event().await?;
            let frames = encoder.encode(&event);
            Some((futures_util::stream::iter(frames), (relay, encoder)))
        })
        .flatten()
    }

    /// Fold the whole generation into one response
    pub async fn collect_response(mut self) -> Result<CanonicalResponse, GatewayError> {
        let mut accumulator = ResponseAccumulator::new();
        while let Some(event) = self.next_event().await {
            accumulator.push(event).map_err(GatewayError::Stream)?;
        }
        Ok(accumulator.finish())
    }

    fn close(&mut self) {
        self.upstream = None;
        self.transition(RelayState::Closed);
    }

    fn transition(&mut self, next: RelayState) {
        tracing::debug!(request_id = %self.request_id, from = %self.state, to = %next, "relay state");
        self.state = next;
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if matches!(self.state, RelayState::Idle | RelayState::Open) {
            tracing::debug!(request_id = %self.request_id, "client went away, cancelling generation");
            self.close();
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("state", &self.state)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

/// Structural check over the event sequence
#[derive(Debug, Default)]
struct OrderCheck {
    started: bool,
    next_index: u32,
    open: HashSet<u32>,
}

impl OrderCheck {
    fn check(&mut self, event: &CanonicalEvent) -> Result<(), String> {
        match event {
            CanonicalEvent::Error(_) => return Ok(()),
            CanonicalEvent::MessageStarted { .. } => {
                if self.started {
                    return Err("message started twice".to_owned());
                }
                self.started = true;
                return Ok(());
            }
            _ if !self.started => return Err("event before message start".to_owned()),
            _ => {}
        }

        match event {
            CanonicalEvent::BlockStarted { index, .. } => {
                if *index != self.next_index {
                    return Err(format!("block {index} opened, expected {}", self.next_index));
                }
                self.next_index += 1;
                self.open.insert(*index);
            }
            CanonicalEvent::BlockDelta { index, .. } => {
                if !self.open.contains(index) {
                    return Err(format!("delta for block {index} which is not open"));
                }
            }
            CanonicalEvent::BlockStopped { index } => {
                if !self.open.remove(index) {
                    return Err(format!("block {index} stopped but not open"));
                }
            }
            CanonicalEvent::MessageStopped { .. } => {
                if !self.open.is_empty() {
                    return Err(format!("message stopped with {} open blocks", self.open.len()));
                }
            }
            CanonicalEvent::MessageStarted { .. } | CanonicalEvent::Error(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conduit_config::ToolCallPolicy;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::adapter::Dialect;
    use crate::convert::ResponseMeta;
    use crate::types::{BlockDelta, BlockKind, StopReason, Usage};

    fn text_events(text: &[&str]) -> Vec<CanonicalEvent> {
        let mut events = vec![
            CanonicalEvent::MessageStarted { usage: Usage::default() },
            CanonicalEvent::BlockStarted {
                index: 0,
                block: BlockKind::Text,
            },
        ];
        events.extend(text.iter().map(|t| CanonicalEvent::BlockDelta {
            index: 0,
            delta: BlockDelta::Text((*t).to_owned()),
        }));
        events.extend([
            CanonicalEvent::BlockStopped { index: 0 },
            CanonicalEvent::MessageStopped {
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            },
        ]);
        events
    }

    fn deadline() -> RequestDeadline {
        RequestDeadline::after(Duration::from_secs(30))
    }

    fn last_error_kind(events: &[CanonicalEvent]) -> Option<ErrorKind> {
        match events.last() {
            Some(CanonicalEvent::Error(report)) => Some(report.kind),
            _ => None,
        }
    }

    async fn drain(relay: &mut Relay) -> Vec<CanonicalEvent> {
        let mut out = Vec::new();
        while let Some(event) = relay.next_event().await {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_events_in_order_and_closes() {
        let mut relay = Relay::new(EventStream::from_events(text_events(&["a", "b"])), deadline());
        assert_eq!(relay.state(), RelayState::Idle);

        let first = relay.next_event().await;
        assert!(matches!(first, Some(CanonicalEvent::MessageStarted { .. })));
        assert_eq!(relay.state(), RelayState::Open);

        let rest = drain(&mut relay).await;
        assert_eq!(rest.len(), 5);
        assert!(rest[4].is_terminal());
        assert_eq!(relay.state(), RelayState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_the_stream_and_cancels_upstream() {
        let cancel = CancellationToken::new();
        let upstream = futures_util::stream::iter(vec![CanonicalEvent::MessageStarted { usage: Usage::default() }])
            .chain(futures_util::stream::pending());
        let mut relay = Relay::new(
            EventStream::new(upstream, cancel.clone()),
            RequestDeadline::after(Duration::from_secs(5)),
        );

        let events = drain(&mut relay).await;

        assert_eq!(events.len(), 2);
        assert_eq!(last_error_kind(&events), Some(ErrorKind::RequestTimeout));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_an_open_relay_cancels_upstream() {
        let cancel = CancellationToken::new();
        let upstream = futures_util::stream::iter(vec![CanonicalEvent::MessageStarted { usage: Usage::default() }])
            .chain(futures_util::stream::pending());
        let mut relay = Relay::new(EventStream::new(upstream, cancel.clone()), deadline());

        relay.next_event().await;
        assert!(!cancel.is_cancelled());
        drop(relay);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_events_become_a_protocol_error() {
        let events = vec![
            CanonicalEvent::MessageStarted { usage: Usage::default() },
            CanonicalEvent::BlockDelta {
                index: 0,
                delta: BlockDelta::Text("orphan".to_owned()),
            },
            CanonicalEvent::BlockStopped { index: 0 },
        ];
        let mut relay = Relay::new(EventStream::from_events(events), deadline());

        let out = drain(&mut relay).await;
        assert_eq!(out.len(), 2);
        assert_eq!(last_error_kind(&out), Some(ErrorKind::AgentProtocolError));
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_upstream_is_a_protocol_error() {
        let mut events = text_events(&["partial"]);
        events.truncate(3);
        let mut relay = Relay::new(EventStream::from_events(events), deadline());

        let out = drain(&mut relay).await;
        assert_eq!(last_error_kind(&out), Some(ErrorKind::AgentProtocolError));
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_text_matches_collected_response() {
        let events = text_events(&["Hel", "lo, ", "world"]);

        let mut relay = Relay::new(EventStream::from_events(events.clone()), deadline());
        let streamed: String = drain(&mut relay)
            .await
            .into_iter()
            .filter_map(|e| match e {
                CanonicalEvent::BlockDelta {
                    delta: BlockDelta::Text(text),
                    ..
                } => Some(text),
                _ => None,
            })
            .collect();

        let collected = Relay::new(EventStream::from_events(events), deadline())
            .collect_response()
            .await
            .unwrap();

        assert_eq!(streamed, "Hello, world");
        assert_eq!(collected.text(), streamed);
    }

    #[tokio::test(start_paused = true)]
    async fn collect_surfaces_stream_errors() {
        let events = vec![
            CanonicalEvent::MessageStarted { usage: Usage::default() },
            CanonicalEvent::error(ErrorKind::AgentTimeout, "the backend agent stopped responding"),
        ];

        let err = Relay::new(EventStream::from_events(events), deadline())
            .collect_response()
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Stream(ErrorReport { kind: ErrorKind::AgentTimeout, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_filter_fails_second_tool_call() {
        let tool = |index: u32, id: &str| {
            [
                CanonicalEvent::BlockStarted {
                    index,
                    block: BlockKind::ToolCall {
                        id: id.to_owned(),
                        name: "lookup".to_owned(),
                    },
                },
                CanonicalEvent::BlockStopped { index },
            ]
        };
        let mut events = vec![CanonicalEvent::MessageStarted { usage: Usage::default() }];
        events.extend(tool(0, "a"));
        events.extend(tool(1, "b"));

        let mut relay = Relay::new(EventStream::from_events(events), deadline())
            .with_filter(ToolCallFilter::for_request(ToolCallPolicy::Strict, false));

        let out = drain(&mut relay).await;
        assert_eq!(out.len(), 4);
        assert_eq!(last_error_kind(&out), Some(ErrorKind::AgentProtocolError));
    }

    #[tokio::test(start_paused = true)]
    async fn openai_frames_end_with_done_after_an_error() {
        let events = vec![
            CanonicalEvent::MessageStarted { usage: Usage::default() },
            CanonicalEvent::BlockStarted {
                index: 0,
                block: BlockKind::Text,
            },
            CanonicalEvent::BlockDelta {
                index: 0,
                delta: BlockDelta::Text("par".to_owned()),
            },
            CanonicalEvent::error(ErrorKind::AgentUnavailable, "the backend agent is unavailable, try again shortly"),
        ];
        let meta = ResponseMeta {
            id: "chatcmpl-1".to_owned(),
            model: "gpt-4o".to_owned(),
            created: 1,
        };

        let frames: Vec<SseFrame> = Relay::new(EventStream::from_events(events), deadline())
            .into_frames(Dialect::OpenAi.stream_encoder(meta, false))
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert!(frames[1].data.contains("agent_unavailable"));
        assert!(frames[2].is_done());
    }
}
