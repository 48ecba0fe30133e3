//! Subprocess plumbing shared by the code and shell tools.
//!
//! Children run with the sandbox root as working directory, an
//! environment reduced to [`ENV_ALLOWLIST`], no stdin, and a hard
//! wall-clock timeout. `kill_on_drop` guarantees a timed-out child is
//! terminated when its wait future is dropped.

use std::process::Stdio;

use pilot_core::error::ToolError;
use pilot_core::text::truncate_with_marker;
use pilot_core::tool::ToolResult;
use pilot_security::sanitize_stderr;
use tokio::process::Command;
use tracing::debug;

use crate::executor::Invocation;

/// Environment variables passed through to sandboxed children.
pub const ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USERPROFILE",
    "LANG",
    "LC_ALL",
    "TMP",
    "TEMP",
    "TMPDIR",
    "SYSTEMROOT",
    "COMSPEC",
    "PYTHONPATH",
    "VIRTUAL_ENV",
];

/// The current environment filtered to [`ENV_ALLOWLIST`].
pub fn sandboxed_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(key, _)| ENV_ALLOWLIST.contains(&key.to_ascii_uppercase().as_str()))
        .collect()
}

/// Spawn `cmd` inside the sandbox and turn its exit into a [`ToolResult`].
pub(crate) async fn run_captured(
    call: &Invocation<'_>,
    mut cmd: Command,
) -> Result<ToolResult, ToolError> {
    let id = &call.tool.id;
    let timeout = call.timeout();

    cmd.current_dir(call.root)
        .env_clear()
        .envs(sandboxed_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| call.failed(format!("failed to start process: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| call.failed(format!("process error: {e}")))?,
        Err(_) => {
            return Err(ToolError::Timeout {
                tool_name: id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = truncate_with_marker(&stdout, call.tool.max_output_chars, "\n[output truncated]");
    debug!(tool_id = %id, status = ?output.status.code(), "Subprocess finished");

    if output.status.success() {
        return Ok(ToolResult::ok(id, stdout));
    }

    let root = call.root.to_string_lossy();
    let stderr = sanitize_stderr(&String::from_utf8_lossy(&output.stderr), Some(&root));
    let error = if stderr.trim().is_empty() {
        match output.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr
    };
    Ok(ToolResult::failure_with_output(id, stdout, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_is_filtered_to_allowlist() {
        for (key, _) in sandboxed_env() {
            assert!(ENV_ALLOWLIST.contains(&key.to_ascii_uppercase().as_str()), "{key} leaked");
        }
    }
}
