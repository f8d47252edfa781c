use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_auth::AccessToken;
use conduit_config::AgentConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Backend, EventStream, Invocation, NativeDecoder, SessionLease, SessionPool};
use crate::error::AgentError;
use crate::types::{CanonicalEvent, CanonicalRequest, ErrorReport};

const EVENT_BUFFER: usize = 64;

/// Backend that runs one sandboxed agent process per request
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    config: Arc<AgentConfig>,
    pool: SessionPool,
}

impl ProcessAgent {
    /// Agent backend for the given configuration
    pub fn new(config: AgentConfig) -> Self {
        let pool = SessionPool::new(config.max_sessions, config.acquire_timeout);
        Self {
            config: Arc::new(config),
            pool,
        }
    }

    async fn spawn(&self, invocation: &Invocation) -> Result<Child, AgentError> {
        match invocation.command().spawn() {
            Ok(child) => Ok(child),
            Err(e) => {
                tracing::warn!(error = %e, command = %self.config.command.display(), "agent spawn failed, retrying");
                tokio::time::sleep(self.config.retry_backoff).await;

                invocation
                    .command()
                    .spawn()
                    .map_err(|e| AgentError::Unavailable(format!("failed to start {}: {e}", self.config.command.display())))
            }
        }
    }
}

#[async_trait]
impl Backend for ProcessAgent {
    async fn dispatch(&self, request: CanonicalRequest, token: AccessToken) -> Result<EventStream, AgentError> {
        let lease = self.pool.acquire().await?;
        let invocation = Invocation::new(&self.config, &request, token);
        tracing::debug!(model = %request.model, occupancy = self.pool.occupancy(), "starting agent session");

        let mut child = self.spawn(&invocation).await?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(drive(
            child,
            invocation.stdin_line().to_owned(),
            lease,
            tx,
            cancel.clone(),
            self.config.idle_timeout,
        ));

        let events = futures_util::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) });
        Ok(EventStream::new(events, cancel))
    }

    async fn probe(&self) -> bool {
        resolve_executable(&self.config.command).await
    }

    fn occupancy(&self) -> usize {
        self.pool.occupancy()
    }
}

/// Own one agent process until it finishes, fails, or is cancelled
async fn drive(
    mut child: Child,
    stdin_line: String,
    lease: SessionLease,
    tx: mpsc::Sender<CanonicalEvent>,
    cancel: CancellationToken,
    idle_timeout: Duration,
) {
    let _lease = lease;

    let failure = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!("agent session cancelled");
            None
        }
        result = pump(&mut child, &stdin_line, &tx, idle_timeout) => result.err(),
    };

    if let Some(err) = failure {
        tracing::warn!(error = %err, "agent session failed");
        let _ = tx.send(CanonicalEvent::Error(ErrorReport::from_error(&err))).await;
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "agent already exited");
    }
    match child.wait().await {
        Ok(status) => tracing::debug!(%status, "agent session ended"),
        Err(e) => tracing::warn!(error = %e, "failed to reap agent process"),
    }
}

async fn pump(
    child: &mut Child,
    stdin_line: &str,
    tx: &mpsc::Sender<CanonicalEvent>,
    idle_timeout: Duration,
) -> Result<(), AgentError> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| AgentError::Unavailable("agent stdin is not piped".to_owned()))?;
    // An agent that exits without reading still reports through stdout
    if let Err(e) = stdin.write_all(format!("{stdin_line}\n").as_bytes()).await {
        tracing::debug!(error = %e, "agent closed its input early");
    }
    drop(stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::Unavailable("agent stdout is not piped".to_owned()))?;
    let mut lines = BufReader::new(stdout).lines();
    let mut decoder = NativeDecoder::new();

    loop {
        let line = tokio::time::timeout(idle_timeout, lines.next_line())
            .await
            .map_err(|_| AgentError::Timeout(idle_timeout))?
            .map_err(|e| AgentError::Protocol(format!("failed to read agent output: {e}")))?
            .ok_or_else(|| AgentError::Protocol("agent exited without a result".to_owned()))?;

        for event in decoder.decode_line(&line)? {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }

        if decoder.is_finished() {
            return Ok(());
        }
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "conduit_llm::agent", "{line}");
    }
}

/// Whether `command` names an executable file, searching `PATH` for bare names
async fn resolve_executable(command: &Path) -> bool {
    if command.components().count() > 1 {
        return is_executable(command).await;
    }

    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    for dir in std::env::split_paths(&path) {
        if is_executable(&dir.join(command)).await {
            return true;
        }
    }
    false
}

async fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        metadata.is_file()
    }
}
