use std::sync::Arc;
use std::time::Duration;

use conduit_config::{RateLimitConfig, RequestRateLimit};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RateLimitError;
use crate::storage::memory::FixedWindowLimiter;

const GLOBAL_KEY: &str = "__global__";

/// Outcome of an admission decision
#[derive(Debug)]
pub enum Admission {
    /// Request may proceed and must finish before the deadline
    Allowed(RequestDeadline),
    /// Request is over quota
    Rejected {
        /// Time until the rejecting window ends
        retry_after: Duration,
    },
}

impl Admission {
    /// Convert into a `Result`, rejecting with `RateLimitError::Exceeded`
    pub fn into_result(self) -> Result<RequestDeadline, RateLimitError> {
        match self {
            Self::Allowed(deadline) => Ok(deadline),
            Self::Rejected { retry_after } => Err(RateLimitError::Exceeded { retry_after }),
        }
    }
}

/// Instant by which an admitted request must complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDeadline {
    at: Instant,
    timeout: Duration,
}

impl RequestDeadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    /// Deadline instant, for `tokio::time::sleep_until` / `timeout_at`
    pub const fn instant(&self) -> Instant {
        self.at
    }

    /// Configured timeout this deadline was derived from
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left, zero once passed
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Gate in front of every proxied request
///
/// Applies the per-client window, then the global window, then stamps the
/// request deadline. Never waits for quota: every call resolves at once.
pub struct AdmissionGate {
    global: Option<FixedWindowLimiter>,
    per_client: Option<FixedWindowLimiter>,
    request_timeout: Duration,
}

impl AdmissionGate {
    /// Build from configuration; `None` disables rate limits but keeps the deadline
    pub fn new(config: Option<&RateLimitConfig>, request_timeout: Duration) -> Result<Self, RateLimitError> {
        let build = |limit: &Option<RequestRateLimit>| {
            limit
                .as_ref()
                .map(|l| FixedWindowLimiter::new(l.requests, l.window))
                .transpose()
        };

        let (global, per_client) = match config {
            Some(config) => (build(&config.global)?, build(&config.per_client)?),
            None => (None, None),
        };

        Ok(Self {
            global,
            per_client,
            request_timeout,
        })
    }

    /// Decide whether `client_key` may proceed
    ///
    /// A request refused by the global scope gives its per-client admission
    /// back, so only admitted requests count against a client.
    pub fn admit(&self, client_key: &str) -> Admission {
        if let Some(limiter) = &self.per_client
            && let Err(RateLimitError::Exceeded { retry_after }) = limiter.check(client_key)
        {
            return Self::reject(client_key, "client", retry_after);
        }

        if let Some(limiter) = &self.global
            && let Err(RateLimitError::Exceeded { retry_after }) = limiter.check(GLOBAL_KEY)
        {
            if let Some(per_client) = &self.per_client {
                per_client.refund(client_key);
            }
            return Self::reject(client_key, "global", retry_after);
        }

        Admission::Allowed(RequestDeadline::after(self.request_timeout))
    }

    fn reject(client_key: &str, scope: &'static str, retry_after: Duration) -> Admission {
        tracing::debug!(
            client = client_key,
            scope,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "admission rejected"
        );
        Admission::Rejected { retry_after }
    }

    /// Per-request timeout
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Drop idle admission records from every scope
    pub fn evict_idle(&self) -> usize {
        [&self.global, &self.per_client]
            .into_iter()
            .flatten()
            .map(FixedWindowLimiter::evict_idle)
            .sum()
    }

    /// Keys currently tracked across scopes
    pub fn tracked_keys(&self) -> usize {
        [&self.global, &self.per_client]
            .into_iter()
            .flatten()
            .map(FixedWindowLimiter::tracked_keys)
            .sum()
    }

    /// Evict idle records once per shortest window until `shutdown` fires
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let period = [&self.global, &self.per_client]
            .into_iter()
            .flatten()
            .map(FixedWindowLimiter::window)
            .min()?;

        let gate = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = gate.evict_idle();
                        if evicted > 0 {
                            tracing::debug!(evicted, "evicted idle admission records");
                        }
                    }
                }
            }
        }))
    }
}
