//! Scripted stand-in for the agent CLI
//!
//! Each fake is a `/bin/sh` script that records what it was given next to
//! itself and then prints canned stream-json.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

pub struct FakeAgent {
    dir: TempDir,
    path: PathBuf,
}

impl FakeAgent {
    /// Streams `text` in word-sized deltas and ends the turn
    pub fn replying(text: &str) -> Self {
        let mut lines = vec![message_start(12)];
        lines.push(stream(json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "text", "text": ""}
        })));
        for chunk in text.split_inclusive(' ') {
            lines.push(stream(json!({
                "type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": chunk}
            })));
        }
        lines.push(stream(json!({"type": "content_block_stop", "index": 0})));
        lines.extend(finish("end_turn", 5));

        Self::from_lines(&lines, "")
    }

    /// Emits a single tool call with `arguments` split across two deltas
    pub fn calling_tool(id: &str, name: &str, arguments: &Value) -> Self {
        let encoded = arguments.to_string();
        let (head, tail) = encoded.split_at(encoded.len() / 2);

        let lines = [
            vec![
                message_start(20),
                stream(json!({
                    "type": "content_block_start", "index": 0,
                    "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}
                })),
                stream(json!({
                    "type": "content_block_delta", "index": 0,
                    "delta": {"type": "input_json_delta", "partial_json": head}
                })),
                stream(json!({
                    "type": "content_block_delta", "index": 0,
                    "delta": {"type": "input_json_delta", "partial_json": tail}
                })),
                stream(json!({"type": "content_block_stop", "index": 0})),
            ],
            finish("tool_use", 8),
        ]
        .concat();

        Self::from_lines(&lines, "")
    }

    /// Starts a message and then goes quiet without exiting
    pub fn stalling() -> Self {
        Self::from_lines(&[message_start(3)], "exec sleep 30")
    }

    /// Reports a failed run on its result line
    pub fn failing(message: &str) -> Self {
        let result = json!({"type": "result", "subtype": "error_during_execution", "is_error": true, "result": message});
        Self::from_lines(&[result.to_string()], "")
    }

    fn from_lines(lines: &[String], tail: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("agent.sh");
        let out = dir.path().display().to_string();

        let script = format!(
            "#!/bin/sh\n\
             read -r request\n\
             printf '%s\\n' \"$request\" > '{out}/request.json'\n\
             printf '%s' \"$CLAUDE_CODE_OAUTH_TOKEN\" > '{out}/token'\n\
             echo $$ > '{out}/pid'\n\
             printf '%s\\n' \"$@\" > '{out}/args'\n\
             cat <<'CONDUIT_EOF'\n\
             {{\"type\":\"system\",\"subtype\":\"init\"}}\n\
             {}\n\
             CONDUIT_EOF\n\
             {tail}\n",
            lines.join("\n"),
        );

        std::fs::write(&path, script).expect("write agent script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod agent script");

        Self { dir, path }
    }

    /// Executable to configure as `agent.command`
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stream-json line the agent read from stdin
    pub fn recorded_request(&self) -> Option<Value> {
        let raw = std::fs::read_to_string(self.dir.path().join("request.json")).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Token the agent saw in its environment
    pub fn recorded_token(&self) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join("token")).ok()
    }

    /// Command-line arguments of the most recent run
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("args"))
            .map(|raw| raw.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Pid of the most recent run
    pub fn pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.dir.path().join("pid")).ok()?.trim().parse().ok()
    }
}

fn stream(event: Value) -> String {
    json!({"type": "stream_event", "event": event, "parent_tool_use_id": null}).to_string()
}

fn message_start(input_tokens: u32) -> String {
    stream(json!({
        "type": "message_start",
        "message": {"usage": {"input_tokens": input_tokens, "output_tokens": 0}}
    }))
}

fn finish(stop_reason: &str, output_tokens: u32) -> Vec<String> {
    vec![
        stream(json!({
            "type": "message_delta",
            "delta": {"stop_reason": stop_reason},
            "usage": {"output_tokens": output_tokens}
        })),
        stream(json!({"type": "message_stop"})),
        json!({"type": "result", "subtype": "success", "is_error": false}).to_string(),
    ]
}
