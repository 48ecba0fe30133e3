//! The sandbox executor: tool lookup, routing policy, kind dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pilot_config::{PilotConfig, ToolConfig};
use pilot_core::error::ToolError;
use pilot_core::memory::MemoryStore;
use pilot_core::tool::{ToolDescriptor, ToolKind, ToolResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{code, filesystem, memory_query, shell};

/// Everything a handler needs for one call.
pub(crate) struct Invocation<'a> {
    pub tool: &'a ToolConfig,
    pub config: &'a PilotConfig,
    pub root: &'a Path,
}

impl Invocation<'_> {
    pub fn timeout(&self) -> Duration {
        self.config.tool_timeout()
    }

    pub fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.tool.id.clone(),
            reason: reason.into(),
        }
    }

    pub fn denied(&self, reason: impl Into<String>) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: self.tool.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Runs configured tools inside the sandbox root.
///
/// Holds an immutable config snapshot; a config reload builds a new
/// executor rather than mutating this one.
pub struct SandboxExecutor {
    config: Arc<PilotConfig>,
    root: PathBuf,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl SandboxExecutor {
    /// Create the executor, creating and canonicalizing the sandbox root.
    pub fn new(config: Arc<PilotConfig>) -> Result<Self, ToolError> {
        let root = pilot_security::prepare_root(&config.sandbox.fs_root)
            .map_err(|e| ToolError::SandboxViolation(format!("cannot prepare sandbox root: {e}")))?;
        debug!(root = %root.display(), "Sandbox root ready");
        Ok(Self {
            config,
            root,
            memory: None,
        })
    }

    /// Attach the store used by memory-kind tools.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn attach_memory(&mut self, memory: Arc<dyn MemoryStore>) {
        self.memory = Some(memory);
    }

    /// The canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Enabled tools whose routing policy is not `never`.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        self.config.available_tools()
    }

    /// Run a tool by id. Never fails: every error becomes a failed result.
    pub async fn execute(&self, tool_id: &str, params: &Map<String, Value>) -> ToolResult {
        let started = Instant::now();
        let result = match self.dispatch(tool_id, params).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(tool_id, e.to_string()),
        };

        if result.success() {
            debug!(
                tool_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tool succeeded"
            );
        } else {
            warn!(
                tool_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = result.error(),
                "Tool failed"
            );
        }
        result
    }

    async fn dispatch(
        &self,
        tool_id: &str,
        params: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .config
            .tool(tool_id)
            .ok_or_else(|| ToolError::NotFound(tool_id.to_string()))?;

        // Disabled and policy-blocked tools are indistinguishable to callers.
        if !self.config.is_tool_available(tool) {
            return Err(ToolError::Unavailable(tool_id.to_string()));
        }

        let call = Invocation {
            tool,
            config: &self.config,
            root: &self.root,
        };

        match tool.kind {
            ToolKind::Filesystem => filesystem::run(&call, params).await,
            ToolKind::Code => code::run(&call, params).await,
            ToolKind::Shell => shell::run(&call, params).await,
            ToolKind::Memory => memory_query::run(&call, self.memory.as_deref(), params).await,
        }
    }
}
