//! `pilot status` — Show system status.

use std::path::Path;

use pilot_core::memory::MemoryStore;

use super::CmdResult;

pub async fn run(config_path: &Path) -> CmdResult {
    let config = super::load_config(config_path)?;

    println!("AI Pilot Status");
    println!("===============");
    println!("  Name:         {} v{}", config.meta.name, config.meta.version);
    println!(
        "  Config:       {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("  Model:        {}", config.runtime.model_id);
    println!("  Planner:      {} (max {} steps)", config.planner.strategy.as_str(), config.planner.max_steps);
    println!("  Sandbox:      {}", config.sandbox.fs_root.display());
    println!("  Tool timeout: {} ms", config.runtime.tool_timeout_ms);
    println!("  Max tools:    {} per turn", config.runtime.max_tool_calls);
    println!(
        "  Redaction:    {}",
        if config.policies.redact_secrets { "on" } else { "off" }
    );
    println!(
        "  Shell tool:   {}",
        if config.policies.allow_shell { "allowed" } else { "blocked" }
    );

    let tools: Vec<String> = config.available_tools().into_iter().map(|t| t.id).collect();
    println!(
        "  Tools:        {}",
        if tools.is_empty() { "(none available)".to_string() } else { tools.join(", ") }
    );

    println!("\nMemory");
    if !config.memory.enabled {
        println!("  disabled");
    } else {
        match super::open_store(&config).await {
            Ok(store) => {
                let stats = store.stats().await?;
                println!("  DB file:      {}", stats.db_path);
                println!("  Facts:        {}", stats.facts);
                println!("  Tasks:        {}", stats.tasks);
                println!("  Doc chunks:   {}", stats.document_chunks);
                store.close().await?;
            }
            Err(e) => println!("  ⚠️  {e}"),
        }
    }

    println!("\nAudit");
    let audit = super::open_audit(&config).stats();
    if audit.enabled {
        println!("  Events:        {} ({} lines)", audit.events_path, audit.events_lines);
        println!(
            "  Conversations: {} ({} lines)",
            audit.conversations_path, audit.conversations_lines
        );
    } else {
        println!("  disabled");
    }

    if !config_path.exists() {
        println!("\n  ⚠️  No config file — run `pilot onboard` first");
    }
    Ok(())
}
