//! Shell tool: allowlisted, read-only commands without a shell.
//!
//! Off unless `policies.allow_shell` is set. The command line is checked
//! for shell metacharacters, split into arguments (single and double
//! quotes group words), and spawned directly, so nothing is ever
//! interpreted by `sh` or `cmd`.

use std::path::Path;

use pilot_core::error::ToolError;
use pilot_core::tool::ToolResult;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::executor::Invocation;
use crate::param_str;
use crate::process::run_captured;

/// Commands the shell tool may run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "dir", "cat", "type", "echo", "pwd", "head", "tail", "wc", "find", "grep", "sort",
];

const METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '!', '\\', '\n', '\r',
];

/// `find` primaries that write files or spawn processes.
const FIND_DENIED: &[&str] = &[
    "-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint", "-fprint0", "-fprintf", "-fls",
];

pub(crate) async fn run(
    call: &Invocation<'_>,
    params: &Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    if !call.config.policies.allow_shell {
        return Err(call.denied("shell commands are disabled by security policy"));
    }

    let command = param_str(params, "command").unwrap_or("");
    let args = validate_command(command).map_err(|reason| call.denied(reason))?;

    let mut cmd = Command::new(&args[0]);
    cmd.args(&args[1..]);
    run_captured(call, cmd).await
}

/// Check a command line and split it into arguments.
///
/// The returned vector is never empty; its first element is the bare
/// allowlisted command name.
pub fn validate_command(command: &str) -> Result<Vec<String>, String> {
    let command = command.trim();
    if command.is_empty() {
        return Err("no command provided".into());
    }
    if command.contains(METACHARACTERS) {
        return Err("command contains shell metacharacters".into());
    }

    let mut args = split_args(command)?;
    let Some(first) = args.first() else {
        return Err("no command provided".into());
    };

    let lowered = first.to_ascii_lowercase();
    let base = lowered.strip_suffix(".exe").unwrap_or(&lowered).to_string();
    if !ALLOWED_COMMANDS.contains(&base.as_str()) {
        return Err(format!(
            "command '{base}' is not in the allowlist (allowed: {})",
            ALLOWED_COMMANDS.join(", ")
        ));
    }

    for arg in &args[1..] {
        let normalized = arg.replace('\\', "/");
        if Path::new(arg).is_absolute()
            || normalized.starts_with('/')
            || normalized.starts_with('~')
            || normalized.split('/').any(|part| part == "..")
        {
            return Err(format!("argument '{arg}' leaves the sandbox"));
        }
    }

    if base == "find"
        && let Some(denied) = args[1..].iter().find(|a| FIND_DENIED.contains(&a.as_str()))
    {
        return Err(format!("find action '{denied}' is not allowed"));
    }

    args[0] = base;
    Ok(args)
}

/// Whitespace split with quote grouping. No escapes: backslashes are
/// rejected as metacharacters before this runs.
fn split_args(command: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unbalanced quotes in command".into());
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_arguments() {
        assert_eq!(
            validate_command("grep -n \"hello world\" 'notes.txt'").unwrap(),
            ["grep", "-n", "hello world", "notes.txt"]
        );
        assert_eq!(validate_command("echo ''").unwrap(), ["echo", ""]);
    }

    #[test]
    fn normalizes_command_name() {
        assert_eq!(validate_command("LS.EXE -la").unwrap(), ["ls", "-la"]);
    }

    #[test]
    fn rejects_commands_outside_allowlist() {
        for cmd in ["rm -rf x", "python -c 1", "cd sub", "curl example.com"] {
            assert!(validate_command(cmd).is_err(), "{cmd:?} should be rejected");
        }
    }

    #[test]
    fn rejects_metacharacters() {
        for cmd in ["ls; rm x", "cat a | sh", "echo $(id)", "echo `id`", "ls > out", "ls\nrm x"] {
            assert!(validate_command(cmd).is_err(), "{cmd:?} should be rejected");
        }
    }

    #[test]
    fn rejects_paths_leaving_sandbox() {
        for cmd in ["cat /etc/passwd", "cat ../secret", "ls sub/../..", "cat ~/.ssh/id_rsa"] {
            assert!(validate_command(cmd).is_err(), "{cmd:?} should be rejected");
        }
    }

    #[test]
    fn rejects_writing_find_actions() {
        assert!(validate_command("find . -name x -delete").is_err());
        assert!(validate_command("find . -fprint out").is_err());
        assert!(validate_command("find . -name '*.md'").is_ok());
    }

    #[test]
    fn rejects_empty_and_unbalanced() {
        assert!(validate_command("   ").is_err());
        assert!(validate_command("echo \"open").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_only_when_policy_allows() {
        use crate::SandboxExecutor;
        use pilot_config::PilotConfig;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let params = serde_json::json!({"command": "echo hello"})
            .as_object()
            .cloned()
            .unwrap();

        let mut config = PilotConfig::default();
        config.sandbox.fs_root = dir.path().to_path_buf();
        if let Some(sh) = config.tools.iter_mut().find(|t| t.id == "sh") {
            sh.enabled = true;
        }

        let locked = SandboxExecutor::new(Arc::new(config.clone())).unwrap();
        let result = locked.execute("sh", &params).await;
        assert!(!result.success());
        assert!(result.error().contains("disabled by security policy"));

        config.policies.allow_shell = true;
        let open = SandboxExecutor::new(Arc::new(config)).unwrap();
        let result = open.execute("sh", &params).await;
        assert!(result.success(), "{}", result.error());
        assert_eq!(result.output().trim(), "hello");
    }
}
