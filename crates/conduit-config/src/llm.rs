use indexmap::IndexMap;
use serde::Deserialize;

/// Protocol translation defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Output token limit applied when an OpenAI-style request sets none
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Temperature applied when a request sets none; unset leaves it to the agent
    #[serde(default)]
    pub default_temperature: Option<f32>,
    /// How to reconcile tool calls a client cannot accept
    #[serde(default)]
    pub tool_call_policy: ToolCallPolicy,
    /// Extra client model aliases, merged over the built-in table
    #[serde(default)]
    pub models: IndexMap<String, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            default_temperature: None,
            tool_call_policy: ToolCallPolicy::default(),
            models: IndexMap::new(),
        }
    }
}

/// Resolution for tool calls a client declared it cannot accept
///
/// Applies when a client disables parallel tool calls and the agent emits
/// more than one in a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPolicy {
    /// Fail the response
    Strict,
    /// Keep the first tool call and drop the rest
    #[default]
    Lenient,
}

const fn default_max_tokens() -> u32 {
    4096
}
