//! Memory trait: the structured store behind retrieval and fact learning.
//!
//! Three collections live behind one store: facts (upsert by key),
//! tasks (caller-driven status), and document chunks (replaced per path
//! on re-index). Each is full-text searchable, and [`MemoryStore::retrieve`]
//! merges all three into one context block for the system prompt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A learned or user-provided fact, unique by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user task. `"open"` is the default status; any other status is
/// caller-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub due_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status assigned to new tasks.
pub const TASK_OPEN: &str = "open";

/// A bounded slice of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: i64,
    pub path: String,
    pub chunk_idx: i64,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Row counts and location of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub facts: u64,
    pub tasks: u64,
    pub document_chunks: u64,
    pub db_path: String,
}

/// The structured memory store.
///
/// Implementations must be safe to share across concurrent turns
/// (`Arc<dyn MemoryStore>`); each call is atomic with respect to the
/// others.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Backend name (e.g., "sqlite", "none").
    fn name(&self) -> &str;

    // --- Facts ---

    /// Insert or update a fact by key. Returns the fact id.
    async fn add_fact(&self, key: &str, value: &str, source: &str) -> Result<i64, MemoryError>;

    async fn get_fact(&self, key: &str) -> Result<Option<Fact>, MemoryError>;

    /// Full-text search over fact keys and values, most relevant first.
    async fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<Fact>, MemoryError>;

    async fn get_all_facts(&self) -> Result<Vec<Fact>, MemoryError>;

    async fn delete_fact(&self, id: i64) -> Result<bool, MemoryError>;

    // --- Tasks ---

    async fn add_task(
        &self,
        title: &str,
        due_at: Option<DateTime<Utc>>,
        payload: Option<serde_json::Value>,
    ) -> Result<i64, MemoryError>;

    /// Returns false if no task has that id.
    async fn update_task_status(&self, id: i64, status: &str) -> Result<bool, MemoryError>;

    async fn get_open_tasks(&self) -> Result<Vec<Task>, MemoryError>;

    async fn get_all_tasks(&self) -> Result<Vec<Task>, MemoryError>;

    /// Full-text search over task titles, any status.
    async fn search_tasks(&self, query: &str, limit: usize) -> Result<Vec<Task>, MemoryError>;

    async fn delete_task(&self, id: i64) -> Result<bool, MemoryError>;

    // --- Documents ---

    /// Chunk and index `content` under `path`, atomically replacing any
    /// chunks previously indexed for that path. Returns the new chunk ids.
    async fn add_document(
        &self,
        path: &str,
        content: &str,
        tags: &[String],
    ) -> Result<Vec<i64>, MemoryError>;

    async fn search_documents(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>, MemoryError>;

    /// Remove every chunk indexed for `path`. Returns how many were removed.
    async fn delete_document(&self, path: &str) -> Result<u64, MemoryError>;

    // --- Retrieval ---

    /// Merge matching facts, document chunks, and open tasks into one
    /// labeled context block. Empty when nothing matches.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<String, MemoryError>;

    async fn stats(&self) -> Result<MemoryStats, MemoryError>;

    /// Release the underlying storage. Later calls fail with
    /// [`MemoryError::Closed`].
    async fn close(&self) -> Result<(), MemoryError>;
}
