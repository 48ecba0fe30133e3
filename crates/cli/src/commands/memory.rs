//! `pilot fact|task|doc|recall` — Memory store commands.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use pilot_core::memory::MemoryStore;
use serde_json::json;

use super::{CmdResult, local_time};

#[derive(Subcommand)]
pub enum FactAction {
    /// Save a fact (replaces the value of an existing key)
    Add {
        key: String,
        value: String,
        #[arg(long, default_value = "user")]
        source: String,
    },
    /// List every stored fact
    List,
    /// Show one fact by key
    Get { key: String },
    /// Delete a fact by id
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create an open task
    Add {
        title: String,
        /// Due date: YYYY-MM-DD or RFC 3339
        #[arg(long)]
        due: Option<String>,
    },
    /// List open tasks
    List {
        /// Include tasks that are no longer open
        #[arg(long)]
        all: bool,
    },
    /// Set a task's status
    Close {
        id: i64,
        #[arg(long, default_value = "done")]
        status: String,
    },
}

#[derive(Subcommand)]
pub enum DocAction {
    /// Chunk and index a text file (re-indexing replaces earlier chunks)
    Index {
        file: PathBuf,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Full-text search over indexed chunks
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
}

pub async fn fact(config_path: &Path, action: FactAction) -> CmdResult {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let audit = super::open_audit(&config);

    match action {
        FactAction::Add { key, value, source } => {
            let id = store.add_fact(&key, &value, &source).await?;
            audit.log_memory_op("add_fact", json!({"id": id, "key": key.trim(), "source": source}));
            println!("Saved fact #{id}: {} = {}", key.trim(), value.trim());
        }
        FactAction::List => {
            let facts = store.get_all_facts().await?;
            if facts.is_empty() {
                println!("No facts stored.");
            }
            for f in facts {
                println!("  #{:<4} {}: {}  [{}; {}]", f.id, f.key, f.value, f.source, local_time(&f.updated_at));
            }
        }
        FactAction::Get { key } => match store.get_fact(&key).await? {
            Some(f) => println!("{}: {}  [{}; {}]", f.key, f.value, f.source, local_time(&f.updated_at)),
            None => println!("No fact with key '{key}'."),
        },
        FactAction::Delete { id } => {
            let removed = store.delete_fact(id).await?;
            audit.log_memory_op("delete_fact", json!({"id": id, "removed": removed}));
            println!("{}", if removed { format!("Deleted fact #{id}.") } else { format!("No fact #{id}.") });
        }
    }

    audit.close()?;
    store.close().await?;
    Ok(())
}

pub async fn task(config_path: &Path, action: TaskAction) -> CmdResult {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let audit = super::open_audit(&config);

    match action {
        TaskAction::Add { title, due } => {
            let due_at = due.as_deref().map(parse_due).transpose()?;
            let id = store.add_task(&title, due_at, None).await?;
            audit.log_memory_op("add_task", json!({"id": id, "title": title}));
            println!("Created task #{id}: {title}");
        }
        TaskAction::List { all } => {
            let tasks = if all {
                store.get_all_tasks().await?
            } else {
                store.get_open_tasks().await?
            };
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for t in tasks {
                let due = t
                    .due_at
                    .map(|d| format!(", due {}", local_time(&d)))
                    .unwrap_or_default();
                println!("  #{:<4} {} ({}{due})", t.id, t.title, t.status);
            }
        }
        TaskAction::Close { id, status } => {
            let updated = store.update_task_status(id, &status).await?;
            audit.log_memory_op(
                "update_task",
                json!({"id": id, "status": status, "updated": updated}),
            );
            if updated {
                println!("Task #{id} is now '{status}'.");
            } else {
                println!("No task #{id}.");
            }
        }
    }

    audit.close()?;
    store.close().await?;
    Ok(())
}

pub async fn doc(config_path: &Path, action: DocAction) -> CmdResult {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;
    let audit = super::open_audit(&config);

    match action {
        DocAction::Index { file, tags } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
            let path = file.to_string_lossy().replace('\\', "/");
            let ids = store.add_document(&path, &content, &tags).await?;
            audit.log_memory_op("add_document", json!({"path": path, "chunks": ids.len()}));
            println!("Indexed {path}: {} chunk(s)", ids.len());
        }
        DocAction::Search { query, limit } => {
            let chunks = store.search_documents(&query, limit).await?;
            if chunks.is_empty() {
                println!("No matching documents.");
            }
            for c in chunks {
                println!("[{} #{}]", c.path, c.chunk_idx);
                if !c.tags.is_empty() {
                    println!("  tags: {}", c.tags.join(", "));
                }
                println!("  {}\n", preview(&c.content, 200));
            }
        }
    }

    audit.close()?;
    store.close().await?;
    Ok(())
}

pub async fn recall(config_path: &Path, query: &str) -> CmdResult {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;

    let context = store.retrieve(query, config.memory.retrieval_top_k).await?;
    if context.trim().is_empty() {
        println!("Nothing in memory matches \"{query}\".");
    } else {
        println!("{context}");
    }

    store.close().await?;
    Ok(())
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("invalid due date '{raw}' (expected YYYY-MM-DD or RFC 3339)"))
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn due_dates() {
        let day = parse_due("2026-03-01").unwrap();
        assert_eq!((day.year(), day.month(), day.day(), day.hour()), (2026, 3, 1, 0));

        let ts = parse_due("2026-03-01T10:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 8);

        assert!(parse_due("next tuesday").is_err());
    }

    #[test]
    fn preview_flattens_and_cuts_on_chars() {
        assert_eq!(preview("a\n\nb   c", 10), "a b c");
        assert_eq!(preview("àèìòù", 3), "àèì…");
    }
}
