pub mod logs;
pub mod memory;
pub mod onboard;
pub mod status;
pub mod tool;

use std::error::Error;
use std::path::Path;

use chrono::{DateTime, Local, Utc};
use pilot_config::PilotConfig;
use pilot_memory::{ChunkConfig, SqliteMemory};
use pilot_security::AuditTrail;

pub type CmdResult = Result<(), Box<dyn Error>>;

pub fn load_config(path: &Path) -> Result<PilotConfig, Box<dyn Error>> {
    Ok(PilotConfig::load_from(path).map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured SQLite store. Unlike a running assistant, the CLI
/// refuses to fall back to a no-op store.
pub async fn open_store(config: &PilotConfig) -> Result<SqliteMemory, Box<dyn Error>> {
    if !config.memory.enabled {
        return Err("memory is disabled in the configuration ([memory] enabled = false)".into());
    }
    let store = SqliteMemory::open(&config.memory.db_path)
        .await
        .map_err(|e| format!("Failed to open memory store: {e}"))?;
    Ok(store.with_chunking(ChunkConfig {
        max_chars: config.memory.chunk_max_chars,
        overlap_chars: config.memory.chunk_overlap_chars,
    }))
}

pub fn open_audit(config: &PilotConfig) -> AuditTrail {
    AuditTrail::from_config(&config.audit).unwrap_or_else(|e| {
        tracing::warn!("Audit trail unavailable: {e}");
        AuditTrail::disabled()
    })
}

pub fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
