//! Memory tool: `search` and `add_fact` against the injected store.

use pilot_core::error::ToolError;
use pilot_core::memory::MemoryStore;
use pilot_core::tool::ToolResult;
use serde_json::{Map, Value};

use crate::executor::Invocation;
use crate::param_str;

/// Source tag for facts the model saves through this tool.
pub const TOOL_FACT_SOURCE: &str = "ai_tool";

pub(crate) async fn run(
    call: &Invocation<'_>,
    memory: Option<&dyn MemoryStore>,
    params: &Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let memory = memory.ok_or_else(|| call.failed("memory store not available"))?;
    let id = &call.tool.id;

    match param_str(params, "action").unwrap_or("search") {
        "search" => {
            let query = param_str(params, "query").unwrap_or("");
            let block = memory
                .retrieve(query, call.config.memory.retrieval_top_k)
                .await
                .map_err(|e| call.failed(e.to_string()))?;
            if block.trim().is_empty() {
                Ok(ToolResult::ok(id, "No results found."))
            } else {
                Ok(ToolResult::ok(id, block))
            }
        }
        "add_fact" => {
            let key = param_str(params, "key").unwrap_or("").trim();
            let value = param_str(params, "value").unwrap_or("").trim();
            if key.is_empty() || value.is_empty() {
                return Err(ToolError::InvalidArguments(
                    "add_fact requires 'key' and 'value'".into(),
                ));
            }
            let fact_id = memory
                .add_fact(key, value, TOOL_FACT_SOURCE)
                .await
                .map_err(|e| call.failed(e.to_string()))?;
            Ok(ToolResult::ok(id, format!("Fact saved with id {fact_id}")))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "unknown memory action '{other}' (expected search or add_fact)"
        ))),
    }
}
