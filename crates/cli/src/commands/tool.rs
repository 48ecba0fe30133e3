//! `pilot tool` — Inspect and run sandboxed tools.

use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use pilot_core::memory::MemoryStore;
use pilot_tools::SandboxExecutor;
use serde_json::{Map, Value};

use super::CmdResult;

#[derive(Subcommand)]
pub enum ToolAction {
    /// List configured tools and whether the assistant may use them
    List,
    /// Run one tool through the sandbox executor
    Run {
        id: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

pub async fn run(config_path: &Path, action: ToolAction) -> CmdResult {
    let config = Arc::new(super::load_config(config_path)?);

    match action {
        ToolAction::List => {
            println!("Tools");
            println!("=====");
            for tool in &config.tools {
                let state = if config.is_tool_available(tool) {
                    "available"
                } else if !tool.enabled {
                    "disabled"
                } else {
                    "blocked by routing"
                };
                println!("  {:<8} {:<12} [{}] {state}", tool.id, tool.kind.as_str(), tool.name);
                println!("           {}", tool.description);
            }
        }
        ToolAction::Run { id, params } => {
            let params = parse_params(&params)?;
            let mut executor = SandboxExecutor::new(config.clone())?;

            let store = if config.memory.enabled {
                let store: Arc<dyn MemoryStore> = Arc::new(super::open_store(&config).await?);
                executor.attach_memory(store.clone());
                Some(store)
            } else {
                None
            };
            let audit = super::open_audit(&config);

            let result = executor.execute(&id, &params).await;
            audit.log_tool_call(&params, &result);

            if result.success() {
                println!("{}", result.output());
            } else {
                eprintln!("Tool '{id}' failed: {}", result.error());
            }

            audit.close()?;
            if let Some(store) = store {
                store.close().await?;
            }
            if !result.success() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn parse_params(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("--params must be a JSON object".into()),
        Err(e) => Err(format!("--params is not valid JSON: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_must_be_an_object() {
        let map = parse_params(r#"{"action": "list"}"#).unwrap();
        assert_eq!(map["action"], "list");
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("{oops").is_err());
    }
}
