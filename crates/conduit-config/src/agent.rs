use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Backend agent process configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Agent executable, resolved against `PATH` when relative
    #[serde(default = "default_command")]
    pub command: PathBuf,
    /// Arguments placed before the generated invocation flags
    #[serde(default)]
    pub args: Vec<String>,
    /// Restricted identity and working directory
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Concurrent agent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How long a dispatch waits for a free session
    #[serde(default = "default_acquire_timeout", deserialize_with = "crate::duration::deserialize")]
    pub acquire_timeout: Duration,
    /// Longest silence tolerated between agent output lines
    #[serde(default = "default_idle_timeout", deserialize_with = "crate::duration::deserialize")]
    pub idle_timeout: Duration,
    /// Delay before the single retry of an unreachable agent
    #[serde(default = "default_retry_backoff", deserialize_with = "crate::duration::deserialize")]
    pub retry_backoff: Duration,
    /// Default permission mode passed to the agent
    #[serde(default)]
    pub permission_mode: Option<String>,
    /// Default tool allow-list passed to the agent
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Default agentic turn limit
    #[serde(default)]
    pub max_turns: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            sandbox: SandboxConfig::default(),
            max_sessions: default_max_sessions(),
            acquire_timeout: default_acquire_timeout(),
            idle_timeout: default_idle_timeout(),
            retry_backoff: default_retry_backoff(),
            permission_mode: None,
            allowed_tools: Vec::new(),
            max_turns: None,
        }
    }
}

/// Identity and filesystem confinement for agent processes
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Numeric user id to run as
    #[serde(default)]
    pub user: Option<u32>,
    /// Numeric group id to run as
    #[serde(default)]
    pub group: Option<u32>,
    /// Working directory; request `cwd` overrides must stay inside it
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Environment variables inherited from the gateway
    #[serde(default = "default_env_passthrough")]
    pub env_passthrough: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            working_directory: None,
            env_passthrough: default_env_passthrough(),
        }
    }
}

fn default_command() -> PathBuf {
    PathBuf::from("claude")
}

const fn default_max_sessions() -> usize {
    4
}

const fn default_acquire_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_idle_timeout() -> Duration {
    Duration::from_secs(120)
}

const fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_env_passthrough() -> Vec<String> {
    ["PATH", "HOME", "LANG"].map(str::to_owned).to_vec()
}
