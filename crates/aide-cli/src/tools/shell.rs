//! Shell command execution tool

use std::process::Stdio;
use std::time::Duration;

use aide_agent::Tool;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;

use super::str_param;

/// Maximum output size in bytes before truncation
const MAX_OUTPUT_SIZE: usize = 100_000;
/// Maximum number of lines before truncation
const MAX_OUTPUT_LINES: usize = 1000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs `execute_command` actions through the platform shell.
pub struct ShellTool {
    timeout: Duration,
}

impl ShellTool {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, command: &str, timeout: Duration) -> String {
        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let child = match Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return format!("Failed to spawn command: {}", e),
        };

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return format!("Failed to wait for command: {}", e),
            Err(_) => {
                tracing::warn!(command, secs = timeout.as_secs(), "command timed out");
                return format!("Command timed out after {} seconds", timeout.as_secs());
            }
        };

        let stdout = clip(&String::from_utf8_lossy(&output.stdout));
        let stderr = clip(&String::from_utf8_lossy(&output.stderr));

        let mut result = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str("[STDERR] ");
            result.push_str(stderr.trim_end());
        }
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&format!("Command failed with exit code {}", code));
        }
        if result.is_empty() {
            result = "(no output)".to_string();
        }
        result
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Cap output by lines and bytes, noting the cut.
fn clip(text: &str) -> String {
    let mut out = String::new();
    let mut lines = 0usize;
    for line in text.lines() {
        if lines >= MAX_OUTPUT_LINES || out.len() + line.len() > MAX_OUTPUT_SIZE {
            out.push_str(&format!(
                "\n... (output truncated at {} lines / {}KB)",
                lines,
                MAX_OUTPUT_SIZE / 1024
            ));
            return out;
        }
        if lines > 0 {
            out.push('\n');
        }
        out.push_str(line);
        lines += 1;
    }
    out
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "executor"
    }

    fn description(&self) -> &str {
        "Execute a shell command (execute_command). Returns stdout; stderr is tagged [STDERR]."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (optional)"
                }
            },
            "required": ["command"]
        }))
    }

    async fn invoke(&self, _kind: &str, _sub_action: Option<&str>, params: &Map<String, Value>) -> String {
        let Some(command) = str_param(params, &["command"]) else {
            return "Error: missing 'command' parameter".to_string();
        };
        let timeout = params
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);

        tracing::debug!(command, "executing shell command");
        self.run(command, timeout).await
    }
}
