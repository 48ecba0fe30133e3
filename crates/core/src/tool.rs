//! Tool vocabulary shared by the executor, the planner, and the audit trail.
//!
//! Tools form a closed set of kinds. Each configured tool has an id (what
//! the model writes in `Action: id(...)`) and exactly one [`ToolKind`]
//! that decides which handler runs it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of tool kinds the sandbox knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// List, read, and write files under the sandbox root.
    #[serde(alias = "fs")]
    Filesystem,
    /// Run a code snippet in an isolated interpreter subprocess.
    #[serde(alias = "python", alias = "py")]
    Code,
    /// Run an allowlisted read-only command.
    #[serde(alias = "sh")]
    Shell,
    /// Query or extend the structured memory store.
    #[serde(alias = "db")]
    Memory,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Filesystem => "filesystem",
            ToolKind::Code => "code",
            ToolKind::Shell => "shell",
            ToolKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the planner and the prompt builder know about an available tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
}

/// The result of one sandboxed tool invocation.
///
/// Fields are private so that `error` is non-empty exactly when
/// `success` is false; build values with [`ToolResult::ok`] or
/// [`ToolResult::failure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    tool_id: String,
    success: bool,
    output: String,
    error: String,
    timestamp: DateTime<Utc>,
}

impl ToolResult {
    /// A successful invocation.
    pub fn ok(tool_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            success: true,
            output: output.into(),
            error: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failed invocation with no output.
    pub fn failure(tool_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::failure_with_output(tool_id, String::new(), error)
    }

    /// A failed invocation that still produced some output (e.g. stdout of
    /// a process that exited non-zero).
    pub fn failure_with_output(
        tool_id: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".into();
        }
        Self {
            tool_id: tool_id.into(),
            success: false,
            output: output.into(),
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The text fed back to the model as an observation.
    pub fn observation(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("ERROR [{}]: {}", self.tool_id, self.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_always_carries_an_error() {
        let result = ToolResult::failure("fs", "");
        assert!(!result.success());
        assert_eq!(result.error(), "unknown error");
    }

    #[test]
    fn success_has_empty_error() {
        let result = ToolResult::ok("fs", "a.txt (3 bytes)");
        assert!(result.success());
        assert!(result.error().is_empty());
        assert_eq!(result.observation(), "a.txt (3 bytes)");
    }

    #[test]
    fn failed_observation_names_the_tool() {
        let result = ToolResult::failure_with_output("py", "partial", "exit status 1");
        assert_eq!(result.output(), "partial");
        assert_eq!(result.observation(), "ERROR [py]: exit status 1");
    }

    #[test]
    fn kind_accepts_legacy_aliases() {
        let kind: ToolKind = serde_json::from_str("\"python\"").unwrap();
        assert_eq!(kind, ToolKind::Code);
        let kind: ToolKind = serde_json::from_str("\"db\"").unwrap();
        assert_eq!(kind, ToolKind::Memory);
        assert_eq!(serde_json::to_string(&ToolKind::Filesystem).unwrap(), "\"filesystem\"");
    }
}
