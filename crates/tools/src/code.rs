//! Code tool: run a Python snippet in an isolated interpreter.
//!
//! The snippet is scanned first; anything touching processes, the OS,
//! networking or dynamic import/eval is rejected without spawning.
//! Accepted snippets run as `<python> -I -c <code>` (isolated mode:
//! no user site-packages, no `PYTHON*` env vars).

use std::sync::LazyLock;

use pilot_core::error::ToolError;
use pilot_core::tool::ToolResult;
use regex_lite::Regex;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::warn;

use crate::executor::Invocation;
use crate::param_str;
use crate::process::run_captured;

static DANGEROUS_CODE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:import|from)\s+(?:os|subprocess|shutil|socket|ctypes|signal|multiprocessing|webbrowser|importlib)\b",
        r"|\b__import__\s*\(",
        r"|\bexec\s*\(",
        r"|\beval\s*\(",
        r"|\bimportlib\b",
        r"|\bgetattr\s*\(\s*__builtins__",
    ))
    .ok()
});

/// Whether a snippet uses a denied import or builtin. Fails closed.
pub fn is_dangerous(code: &str) -> bool {
    DANGEROUS_CODE.as_ref().is_none_or(|re| re.is_match(code))
}

pub(crate) async fn run(
    call: &Invocation<'_>,
    params: &Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let code = param_str(params, "code").unwrap_or("");
    if code.trim().is_empty() {
        return Err(ToolError::InvalidArguments("no code provided".into()));
    }
    if is_dangerous(code) {
        warn!(tool_id = %call.tool.id, "Rejected snippet with denied imports");
        return Err(call.denied("code uses imports or builtins that are not allowed in the sandbox"));
    }

    let mut cmd = Command::new(&call.config.sandbox.python);
    cmd.arg("-I").arg("-c").arg(code);
    run_captured(call, cmd).await
}
