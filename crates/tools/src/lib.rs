//! Sandboxed tool execution for AI Pilot.
//!
//! Every configured tool has exactly one [`ToolKind`](pilot_core::ToolKind),
//! and each kind has one handler module:
//!
//! - [`filesystem`]: list/read/write under the sandbox root
//! - [`code`]: run a Python snippet in an isolated subprocess
//! - [`shell`]: run an allowlisted read-only command (off by default)
//! - [`memory_query`]: search or extend the injected memory store
//!
//! [`SandboxExecutor::execute`] never returns an error: unknown tools,
//! policy blocks, sandbox violations, timeouts and non-zero exits all
//! come back as a failed [`ToolResult`](pilot_core::ToolResult).

pub mod code;
pub mod executor;
pub mod filesystem;
pub mod memory_query;
pub mod process;
pub mod shell;

pub use executor::SandboxExecutor;

use serde_json::{Map, Value};

/// A string parameter, if present and a string.
pub(crate) fn param_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}
