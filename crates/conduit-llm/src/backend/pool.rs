use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AgentError;

/// Bounded set of agent sessions
#[derive(Debug, Clone)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

/// One held session; released on drop
#[derive(Debug)]
pub struct SessionLease {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    /// Pool of `capacity` sessions
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
        }
    }

    /// Take a session, waiting at most the acquire timeout
    pub async fn acquire(&self) -> Result<SessionLease, AgentError> {
        let permit = tokio::time::timeout(self.acquire_timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| {
                AgentError::Unavailable(format!(
                    "all {} agent sessions busy for {}ms",
                    self.capacity,
                    self.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| AgentError::Unavailable("session pool closed".to_owned()))?;

        Ok(SessionLease { _permit: permit })
    }

    /// Sessions currently leased
    pub fn occupancy(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }
}
