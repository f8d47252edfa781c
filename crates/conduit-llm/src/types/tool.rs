use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// Function the client can execute on the model's behalf
///
/// `parameters` is passed through untouched; the gateway never checks
/// arguments against it.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Constraint on tool use for the next turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    /// At least one call, any tool
    Any,
    None,
    /// Exactly this tool
    Tool { name: String },
}
