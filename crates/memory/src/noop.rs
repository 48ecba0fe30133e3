//! No-op memory backend — persistence disabled.
//!
//! The orchestrator falls back to this when the database cannot be
//! opened, so turns still work without retrieval or fact learning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilot_core::error::MemoryError;
use pilot_core::memory::{DocumentChunk, Fact, MemoryStats, MemoryStore, Task};

/// A memory backend that stores nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryStore for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn add_fact(&self, _key: &str, _value: &str, _source: &str) -> Result<i64, MemoryError> {
        Ok(0)
    }

    async fn get_fact(&self, _key: &str) -> Result<Option<Fact>, MemoryError> {
        Ok(None)
    }

    async fn search_facts(&self, _query: &str, _limit: usize) -> Result<Vec<Fact>, MemoryError> {
        Ok(Vec::new())
    }

    async fn get_all_facts(&self) -> Result<Vec<Fact>, MemoryError> {
        Ok(Vec::new())
    }

    async fn delete_fact(&self, _id: i64) -> Result<bool, MemoryError> {
        Ok(false)
    }

    async fn add_task(
        &self,
        _title: &str,
        _due_at: Option<DateTime<Utc>>,
        _payload: Option<serde_json::Value>,
    ) -> Result<i64, MemoryError> {
        Ok(0)
    }

    async fn update_task_status(&self, _id: i64, _status: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }

    async fn get_open_tasks(&self) -> Result<Vec<Task>, MemoryError> {
        Ok(Vec::new())
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>, MemoryError> {
        Ok(Vec::new())
    }

    async fn search_tasks(&self, _query: &str, _limit: usize) -> Result<Vec<Task>, MemoryError> {
        Ok(Vec::new())
    }

    async fn delete_task(&self, _id: i64) -> Result<bool, MemoryError> {
        Ok(false)
    }

    async fn add_document(
        &self,
        _path: &str,
        _content: &str,
        _tags: &[String],
    ) -> Result<Vec<i64>, MemoryError> {
        Ok(Vec::new())
    }

    async fn search_documents(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<DocumentChunk>, MemoryError> {
        Ok(Vec::new())
    }

    async fn delete_document(&self, _path: &str) -> Result<u64, MemoryError> {
        Ok(0)
    }

    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        Ok(MemoryStats {
            db_path: "(disabled)".into(),
            ..MemoryStats::default()
        })
    }

    async fn close(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
