use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::RateLimitError;

/// In-memory fixed-window counters, one per key
///
/// A key's window opens at its first request and lasts `window`; the next
/// request after that opens a fresh window. Each key is mutated under its
/// own shard lock, so unrelated keys never wait on each other.
pub struct FixedWindowLimiter {
    records: DashMap<String, AdmissionRecord>,
    max_requests: u32,
    window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct AdmissionRecord {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

impl AdmissionRecord {
    const fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }

    fn admit(&mut self, now: Instant, max_requests: u32, window: Duration) -> Result<(), RateLimitError> {
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= window {
            self.window_start = now;
            self.count = 0;
        }

        self.last_seen = now;

        if self.count >= max_requests {
            return Err(RateLimitError::Exceeded {
                retry_after: window.saturating_sub(now.duration_since(self.window_start)),
            });
        }

        self.count += 1;
        Ok(())
    }
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window` per key
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Err(RateLimitError::Config("max_requests must be > 0".to_owned()));
        }
        if window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_owned()));
        }

        Ok(Self {
            records: DashMap::new(),
            max_requests,
            window,
        })
    }

    /// Count one admission attempt for `key`
    ///
    /// Rejected attempts do not consume quota.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();

        if let Some(mut record) = self.records.get_mut(key) {
            return record.admit(now, self.max_requests, self.window);
        }

        self.records
            .entry(key.to_owned())
            .or_insert_with(|| AdmissionRecord::new(now))
            .admit(now, self.max_requests, self.window)
    }

    /// Return one admission to `key` that a later scope refused
    pub fn refund(&self, key: &str) {
        if let Some(mut record) = self.records.get_mut(key) {
            record.count = record.count.saturating_sub(1);
        }
    }

    /// Drop keys idle for longer than one window
    ///
    /// An evicted key's window had already ended, so eviction never
    /// resets a live count.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records
            .retain(|_, record| now.duration_since(record.last_seen) <= self.window);
        before.saturating_sub(self.records.len())
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    /// Window length
    pub const fn window(&self) -> Duration {
        self.window
    }
}
