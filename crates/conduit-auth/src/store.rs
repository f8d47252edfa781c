use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use conduit_config::CredentialsConfig;
use jiff::Timestamp;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{AccessToken, Credential, CredentialError, CredentialFile, OAuthExchange, RefreshExchange};

/// Owner of the backend credential
///
/// Cheap to clone; every clone shares the same credential. Readers take a
/// snapshot of an immutable `Credential`, so a refresh never exposes a
/// partially written token.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

struct Inner {
    current: RwLock<Option<Arc<Credential>>>,
    /// Held for the whole duration of a refresh exchange
    refresh_lock: Mutex<RefreshOutcome>,
    /// Bumped after every completed exchange, successful or not
    generation: AtomicU64,
    exchange: Arc<dyn RefreshExchange>,
    file: Option<CredentialFile>,
    margin: Duration,
    retry_interval: Duration,
}

/// Result of the most recent exchange, shared with callers that waited on it
#[derive(Default)]
struct RefreshOutcome {
    error: Option<String>,
    failed_at: Option<Instant>,
}

impl RefreshOutcome {
    /// Error of a failed exchange still inside its retry interval
    fn backing_off(&self, retry_interval: Duration) -> Option<&str> {
        let failed_at = self.failed_at?;
        if failed_at.elapsed() >= retry_interval {
            return None;
        }
        self.error.as_deref()
    }
}

impl CredentialStore {
    /// Create a store around an optional initial credential
    pub fn new(
        initial: Option<Credential>,
        exchange: Arc<dyn RefreshExchange>,
        file: Option<CredentialFile>,
        margin: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(initial.map(Arc::new)),
                refresh_lock: Mutex::new(RefreshOutcome::default()),
                generation: AtomicU64::new(0),
                exchange,
                file,
                margin,
                retry_interval,
            }),
        }
    }

    /// Build the store from configuration, reading the credential file
    ///
    /// A missing file is not an error: the store starts empty and reports
    /// `CredentialUnavailable` until a credential appears.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or the
    /// exchange client cannot be built
    pub async fn from_config(config: &CredentialsConfig) -> anyhow::Result<Self> {
        let path = config
            .resolved_path()
            .ok_or_else(|| anyhow::anyhow!("no credential file path configured"))?;
        let file = CredentialFile::new(path);

        let initial = file.load().await?;
        match initial {
            Some(ref credential) => tracing::info!(
                path = %file.path().display(),
                expires_at = %credential.expires_at(),
                "loaded backend credential"
            ),
            None => tracing::warn!(path = %file.path().display(), "credential file not found"),
        }

        let exchange = OAuthExchange::new(
            config.token_url.clone(),
            config.client_id.clone(),
            config.exchange_timeout,
        )?;

        Ok(Self::new(
            initial,
            Arc::new(exchange),
            Some(file),
            config.refresh_margin,
            config.retry_interval,
        ))
    }

    /// Token for a single request
    ///
    /// Inside the refresh margin this joins (or starts) the single in-flight
    /// refresh. If that refresh fails the previous token is still served
    /// until its true expiry, and no new exchange starts until the retry
    /// interval has passed.
    ///
    /// # Errors
    ///
    /// `CredentialError::Unavailable` when nothing is loaded,
    /// `CredentialError::Expired` when the token has expired and refresh failed
    pub async fn current_token(&self) -> Result<AccessToken, CredentialError> {
        let credential = self.snapshot().await.ok_or(CredentialError::Unavailable)?;

        if !credential.expires_within(self.inner.margin, Timestamp::now()) {
            return Ok(credential.access_token());
        }

        match self.refresh().await {
            Ok(fresh) => Ok(fresh.access_token()),
            Err(error) => {
                tracing::warn!(%error, "serving previous credential after failed refresh");

                let held = self.snapshot().await.ok_or(CredentialError::Unavailable)?;
                if held.is_expired(Timestamp::now()) {
                    Err(CredentialError::Expired {
                        expired_at: held.expires_at(),
                    })
                } else {
                    Ok(held.access_token())
                }
            }
        }
    }

    /// Whether a non-expired credential is held
    pub async fn has_valid_token(&self) -> bool {
        self.snapshot()
            .await
            .is_some_and(|credential| !credential.is_expired(Timestamp::now()))
    }

    /// Current credential, if any
    pub async fn snapshot(&self) -> Option<Arc<Credential>> {
        self.inner.current.read().await.clone()
    }

    /// Refresh now, collapsing into an exchange already in flight
    ///
    /// The exchange runs on its own task: a caller that gives up waiting
    /// does not abort a refresh that may already have rotated the refresh
    /// token server-side.
    ///
    /// # Errors
    ///
    /// Returns the error of the exchange this call joined or started
    pub async fn refresh(&self) -> Result<Arc<Credential>, CredentialError> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move { inner.refresh_after(observed).await })
            .await
            .map_err(|e| CredentialError::Internal(anyhow::anyhow!("refresh task failed: {e}")))?
    }

    /// Keep the credential fresh until `shutdown` fires
    pub fn spawn_refresh_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                let wait = store.next_refresh_in().await;
                tracing::debug!(wait_secs = wait.as_secs(), "next credential refresh check");

                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }

                if store.snapshot().await.is_none() {
                    store.reload_from_file().await;
                    continue;
                }

                let due = store
                    .snapshot()
                    .await
                    .is_some_and(|c| c.expires_within(store.inner.margin, Timestamp::now()));

                if !due {
                    continue;
                }

                match store.refresh().await {
                    Ok(credential) => {
                        tracing::info!(expires_at = %credential.expires_at(), "refreshed backend credential");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "background credential refresh failed");
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            () = tokio::time::sleep(store.inner.retry_interval) => {}
                        }
                    }
                }
            }

            tracing::debug!("credential refresh loop stopped");
        })
    }

    /// Pick up a credential written to disk after startup
    async fn reload_from_file(&self) {
        let Some(ref file) = self.inner.file else {
            return;
        };

        match file.load().await {
            Ok(Some(credential)) => {
                tracing::info!(expires_at = %credential.expires_at(), "loaded backend credential");
                *self.inner.current.write().await = Some(Arc::new(credential));
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "failed to reload credential file"),
        }
    }

    /// Delay until the held credential enters its refresh margin
    async fn next_refresh_in(&self) -> Duration {
        match self.snapshot().await {
            Some(credential) => credential
                .remaining(Timestamp::now())
                .saturating_sub(self.inner.margin),
            None => self.inner.retry_interval,
        }
    }
}

impl Inner {
    async fn refresh_after(&self, observed: u64) -> Result<Arc<Credential>, CredentialError> {
        let mut outcome = self.refresh_lock.lock().await;

        // An exchange finished while this caller waited: share its result
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(ref error) = outcome.error {
                return Err(CredentialError::RefreshFailed(error.clone()));
            }
            return self.current.read().await.clone().ok_or(CredentialError::Unavailable);
        }

        let held = self.current.read().await.clone().ok_or(CredentialError::Unavailable)?;
        if !held.expires_within(self.margin, Timestamp::now()) {
            return Ok(held);
        }

        if let Some(error) = outcome.backing_off(self.retry_interval) {
            return Err(CredentialError::RefreshFailed(error.to_owned()));
        }

        let result = self.exchange.refresh(held.refresh_token()).await;
        self.generation.fetch_add(1, Ordering::AcqRel);

        let fresh = match result {
            Ok(credential) => Arc::new(credential),
            Err(error) => {
                outcome.error = Some(error.to_string());
                outcome.failed_at = Some(Instant::now());
                return Err(error);
            }
        };

        outcome.error = None;
        outcome.failed_at = None;
        *self.current.write().await = Some(Arc::clone(&fresh));

        if let Some(ref file) = self.file
            && let Err(error) = file.save(&fresh).await
        {
            tracing::warn!(%error, "failed to persist refreshed credential");
        }

        Ok(fresh)
    }
}
