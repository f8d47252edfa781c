use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use conduit_auth::AccessToken;
use conduit_config::AgentConfig;
use serde_json::{Value, json};

use crate::types::{CanonicalRequest, ContentBlock, MediaSource, Message, Role, ToolChoice};

const TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
const THINKING_ENV: &str = "MAX_THINKING_TOKENS";

/// Fully resolved agent command line and its stdin payload
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, OsString)>,
    token: AccessToken,
    current_dir: Option<PathBuf>,
    uid: Option<u32>,
    gid: Option<u32>,
    stdin_line: String,
}

impl Invocation {
    /// Invocation for one request under the configured sandbox
    pub fn new(config: &AgentConfig, request: &CanonicalRequest, token: AccessToken) -> Self {
        let mut args = config.args.clone();
        args.extend(
            [
                "--print",
                "--verbose",
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--include-partial-messages",
                "--model",
            ]
            .map(str::to_owned),
        );
        args.push(request.model.clone());

        if let Some(prompt) = appended_system_prompt(request) {
            args.push("--append-system-prompt".to_owned());
            args.push(prompt);
        }
        if let Some(max_turns) = request.agent.max_turns.or(config.max_turns) {
            args.push("--max-turns".to_owned());
            args.push(max_turns.to_string());
        }

        let allowed_tools = request
            .agent
            .allowed_tools
            .as_deref()
            .unwrap_or(&config.allowed_tools);
        if !allowed_tools.is_empty() {
            args.push("--allowedTools".to_owned());
            args.push(allowed_tools.join(","));
        }
        if let Some(mode) = request.agent.permission_mode.as_ref().or(config.permission_mode.as_ref()) {
            args.push("--permission-mode".to_owned());
            args.push(mode.clone());
        }

        let mut env: Vec<(String, OsString)> = config
            .sandbox
            .env_passthrough
            .iter()
            .filter_map(|name| std::env::var_os(name).map(|value| (name.clone(), value)))
            .collect();
        if let Some(budget) = request.agent.thinking_budget {
            env.push((THINKING_ENV.to_owned(), budget.to_string().into()));
        }

        Self {
            program: config.command.clone(),
            args,
            env,
            token,
            current_dir: request
                .agent
                .cwd
                .clone()
                .or_else(|| config.sandbox.working_directory.clone()),
            uid: config.sandbox.user,
            gid: config.sandbox.group,
            stdin_line: stdin_line(request),
        }
    }

    /// Generated arguments, after the configured extra ones
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The single stream-json line written to the agent's stdin
    pub fn stdin_line(&self) -> &str {
        &self.stdin_line
    }

    /// Process builder with the sandbox applied
    pub fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(self.env.iter().map(|(name, value)| (name, value)))
            .env(TOKEN_ENV, self.token.expose())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        {
            if let Some(uid) = self.uid {
                command.uid(uid);
            }
            if let Some(gid) = self.gid {
                command.gid(gid);
            }
        }

        command
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("current_dir", &self.current_dir)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .finish_non_exhaustive()
    }
}

/// System prompt, then a description of the tools the client can execute
fn appended_system_prompt(request: &CanonicalRequest) -> Option<String> {
    let mut prompt = request.system_prompt().unwrap_or_default();

    if !request.tools.is_empty() && request.tool_choice != Some(ToolChoice::None) {
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("The caller can run the following tools on your behalf:\n");
        for tool in &request.tools {
            prompt.push_str("\n- ");
            prompt.push_str(&tool.name);
            if let Some(description) = &tool.description {
                prompt.push_str(": ");
                prompt.push_str(description);
            }
            prompt.push_str(&format!("\n  parameters: {}", tool.parameters));
        }
        match &request.tool_choice {
            Some(ToolChoice::Any) => prompt.push_str("\n\nYou must call one of these tools."),
            Some(ToolChoice::Tool { name }) => {
                prompt.push_str(&format!("\n\nYou must call the `{name}` tool."));
            }
            _ => {}
        }
        if !request.parallel_tool_calls {
            prompt.push_str("\n\nCall at most one tool per turn.");
        }
    }

    (!prompt.is_empty()).then_some(prompt)
}

/// Stream-json user message: earlier turns as a transcript, then the final turn
fn stdin_line(request: &CanonicalRequest) -> String {
    let turns: Vec<&Message> = request.messages.iter().filter(|m| m.role != Role::System).collect();
    let (last, history) = match turns.split_last() {
        Some((last, history)) => (Some(*last), history),
        None => (None, &[][..]),
    };

    let mut content = Vec::new();
    if !history.is_empty() {
        let mut transcript = String::from("<conversation_history>\n");
        for message in history {
            render_turn(&mut transcript, message);
        }
        transcript.push_str("</conversation_history>");
        content.push(json!({"type": "text", "text": transcript}));
    }

    if let Some(last) = last {
        for block in &last.content {
            content.push(match block {
                ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                ContentBlock::Image { source } => image_block(source),
                ContentBlock::ToolResult {
                    call_id,
                    content,
                    is_error,
                } => {
                    let label = if *is_error { "Tool error" } else { "Tool result" };
                    json!({"type": "text", "text": format!("{label} for call {call_id}:\n{content}")})
                }
                ContentBlock::ToolCall { id, name, arguments } => {
                    json!({"type": "text", "text": format!("[tool call {name} ({id}): {arguments}]")})
                }
            });
        }
    }

    json!({
        "type": "user",
        "message": {"role": "user", "content": content},
    })
    .to_string()
}

fn render_turn(out: &mut String, message: &Message) {
    let speaker = match message.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
        Role::System => return,
    };

    for block in &message.content {
        let line = match block {
            ContentBlock::Text { text } => format!("{speaker}: {text}"),
            ContentBlock::Image { .. } => format!("{speaker}: [image]"),
            ContentBlock::ToolCall { id, name, arguments } => {
                format!("{speaker}: [tool call {name} ({id}): {arguments}]")
            }
            ContentBlock::ToolResult {
                call_id,
                content,
                is_error,
            } => {
                let label = if *is_error { "error" } else { "result" };
                format!("{speaker}: [{label} for {call_id}: {content}]")
            }
        };
        out.push_str(&line);
        out.push('\n');
    }
}

fn image_block(source: &MediaSource) -> Value {
    match source {
        MediaSource::Base64 { media_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
        MediaSource::Url { url } => json!({
            "type": "image",
            "source": {"type": "url", "url": url},
        }),
    }
}
