//! Backend agent adapter

mod invocation;
mod native;
mod pool;
mod process;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use conduit_auth::AccessToken;
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

pub use self::invocation::Invocation;
pub use self::native::NativeDecoder;
pub use self::pool::{SessionLease, SessionPool};
pub use self::process::ProcessAgent;
use crate::error::AgentError;
use crate::types::{CanonicalEvent, CanonicalRequest};

/// Something that can run a canonical request
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start a generation and return its events
    ///
    /// Failures before the first event are returned as errors; failures
    /// after that arrive as a terminal [`CanonicalEvent::Error`].
    async fn dispatch(&self, request: CanonicalRequest, token: AccessToken) -> Result<EventStream, AgentError>;

    /// Whether the backend looks able to serve requests
    async fn probe(&self) -> bool;

    /// Sessions currently in use
    fn occupancy(&self) -> usize;
}

/// Events of one dispatched generation
///
/// Dropping the stream cancels the generation and releases its session.
pub struct EventStream {
    events: Pin<Box<dyn Stream<Item = CanonicalEvent> + Send>>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Wrap a stream whose producer stops when `cancel` fires
    pub fn new(events: impl Stream<Item = CanonicalEvent> + Send + 'static, cancel: CancellationToken) -> Self {
        Self {
            events: Box::pin(events),
            cancel,
        }
    }

    /// Stream over a fixed list of events
    pub fn from_events(events: Vec<CanonicalEvent>) -> Self {
        Self::new(futures_util::stream::iter(events), CancellationToken::new())
    }
}

impl Stream for EventStream {
    type Item = CanonicalEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
