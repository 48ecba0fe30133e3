//! SQLite backend with FTS5 full-text search.
//!
//! One database file holds three content tables, each mirrored by an
//! external-content FTS5 index:
//! - `facts` / `facts_fts` — key/value pairs, unique by key
//! - `tasks` / `tasks_fts` — titles with a free-form status
//! - `documents` / `documents_fts` — chunked file content, unique by (path, chunk_idx)
//!
//! Triggers keep every FTS index in sync on insert/delete/update.
//!
//! All access goes through a single connection behind an async mutex.
//! Each public operation takes the lock exactly once and passes the
//! connection down to plain helper functions, so composite operations
//! like [`MemoryStore::retrieve`] never re-enter the lock.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilot_core::error::MemoryError;
use pilot_core::memory::{DocumentChunk, Fact, MemoryStats, MemoryStore, TASK_OPEN, Task};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkConfig, chunk_text};
use crate::context::{MAX_CONTEXT_TASKS, format_context};
use crate::fts::{like_pattern, sanitize_fts_query};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "facts table",
        r#"
        CREATE TABLE IF NOT EXISTS facts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            key         TEXT NOT NULL UNIQUE,
            value       TEXT NOT NULL,
            source      TEXT NOT NULL DEFAULT 'user',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "facts FTS table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
            key,
            value,
            content='facts',
            content_rowid='id',
            tokenize='unicode61 remove_diacritics 2'
        )
        "#,
    ),
    (
        "facts insert trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS facts_ai AFTER INSERT ON facts BEGIN
            INSERT INTO facts_fts(rowid, key, value) VALUES (new.id, new.key, new.value);
        END
        "#,
    ),
    (
        "facts delete trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS facts_ad AFTER DELETE ON facts BEGIN
            INSERT INTO facts_fts(facts_fts, rowid, key, value)
            VALUES ('delete', old.id, old.key, old.value);
        END
        "#,
    ),
    (
        "facts update trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS facts_au AFTER UPDATE ON facts BEGIN
            INSERT INTO facts_fts(facts_fts, rowid, key, value)
            VALUES ('delete', old.id, old.key, old.value);
            INSERT INTO facts_fts(rowid, key, value) VALUES (new.id, new.key, new.value);
        END
        "#,
    ),
    (
        "tasks table",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'open',
            due_at      TEXT,
            payload     TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "tasks FTS table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS tasks_fts USING fts5(
            title,
            content='tasks',
            content_rowid='id',
            tokenize='unicode61 remove_diacritics 2'
        )
        "#,
    ),
    (
        "tasks insert trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS tasks_ai AFTER INSERT ON tasks BEGIN
            INSERT INTO tasks_fts(rowid, title) VALUES (new.id, new.title);
        END
        "#,
    ),
    (
        "tasks delete trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS tasks_ad AFTER DELETE ON tasks BEGIN
            INSERT INTO tasks_fts(tasks_fts, rowid, title) VALUES ('delete', old.id, old.title);
        END
        "#,
    ),
    (
        "tasks update trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS tasks_au AFTER UPDATE ON tasks BEGIN
            INSERT INTO tasks_fts(tasks_fts, rowid, title) VALUES ('delete', old.id, old.title);
            INSERT INTO tasks_fts(rowid, title) VALUES (new.id, new.title);
        END
        "#,
    ),
    (
        "tasks status index",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    ),
    (
        "documents table",
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            path        TEXT NOT NULL,
            chunk_idx   INTEGER NOT NULL,
            content     TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL,
            UNIQUE(path, chunk_idx)
        )
        "#,
    ),
    (
        "documents FTS table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
            path,
            content,
            content='documents',
            content_rowid='id',
            tokenize='unicode61 remove_diacritics 2'
        )
        "#,
    ),
    (
        "documents insert trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, path, content) VALUES (new.id, new.path, new.content);
        END
        "#,
    ),
    (
        "documents delete trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, path, content)
            VALUES ('delete', old.id, old.path, old.content);
        END
        "#,
    ),
    (
        "documents update trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, path, content)
            VALUES ('delete', old.id, old.path, old.content);
            INSERT INTO documents_fts(rowid, path, content) VALUES (new.id, new.path, new.content);
        END
        "#,
    ),
];

/// The durable memory store.
pub struct SqliteMemory {
    conn: Mutex<Option<SqliteConnection>>,
    db_path: String,
    chunking: ChunkConfig,
}

impl SqliteMemory {
    /// Open (or create) the database at `path`, creating parent
    /// directories as needed.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let store = Self::connect(options, path.display().to_string()).await?;
        info!(db_path = %store.db_path, "SQLite memory store initialized");
        Ok(store)
    }

    /// An ephemeral in-process database.
    pub async fn in_memory() -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, ":memory:".into()).await
    }

    /// Override how documents are split into chunks.
    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    async fn connect(options: SqliteConnectOptions, db_path: String) -> Result<Self, MemoryError> {
        let mut conn = options
            .connect()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        for (label, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&mut conn)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{label}: {e}")))?;
        }
        debug!("SQLite migrations complete");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path,
            chunking: ChunkConfig::default(),
        })
    }
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, MemoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| MemoryError::QueryFailed(format!("{name} column: {e}")))
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_fact(row: &SqliteRow) -> Result<Fact, MemoryError> {
    Ok(Fact {
        id: col(row, "id")?,
        key: col(row, "key")?,
        value: col(row, "value")?,
        source: col(row, "source")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?),
        updated_at: parse_ts(&col::<String>(row, "updated_at")?),
    })
}

fn row_to_task(row: &SqliteRow) -> Result<Task, MemoryError> {
    let due_at: Option<String> = col(row, "due_at")?;
    let payload: String = col(row, "payload")?;
    Ok(Task {
        id: col(row, "id")?,
        title: col(row, "title")?,
        status: col(row, "status")?,
        due_at: due_at.as_deref().map(parse_ts),
        payload: serde_json::from_str(&payload).unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_ts(&col::<String>(row, "created_at")?),
        updated_at: parse_ts(&col::<String>(row, "updated_at")?),
    })
}

fn row_to_chunk(row: &SqliteRow) -> Result<DocumentChunk, MemoryError> {
    let tags: String = col(row, "tags")?;
    Ok(DocumentChunk {
        id: col(row, "id")?,
        path: col(row, "path")?,
        chunk_idx: col(row, "chunk_idx")?,
        content: col(row, "content")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: parse_ts(&col::<String>(row, "created_at")?),
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Run an FTS query; if FTS5 rejects it, fall back to a LIKE scan.
async fn fts_or_like(
    conn: &mut SqliteConnection,
    table: &str,
    fts_sql: &str,
    like_sql: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<SqliteRow>, MemoryError> {
    let fts_query = sanitize_fts_query(query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    match sqlx::query(fts_sql)
        .bind(&fts_query)
        .bind(limit_param(limit))
        .fetch_all(&mut *conn)
        .await
    {
        Ok(rows) => Ok(rows),
        Err(e) => {
            warn!(table, error = %e, "FTS query failed, falling back to LIKE");
            sqlx::query(like_sql)
                .bind(like_pattern(query))
                .bind(limit_param(limit))
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("{table} LIKE search: {e}")))
        }
    }
}

async fn search_facts_in(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<Fact>, MemoryError> {
    let rows = fts_or_like(
        conn,
        "facts",
        r#"
        SELECT f.* FROM facts_fts
        JOIN facts f ON f.id = facts_fts.rowid
        WHERE facts_fts MATCH ?1
        ORDER BY bm25(facts_fts), f.id
        LIMIT ?2
        "#,
        r#"
        SELECT * FROM facts
        WHERE key LIKE ?1 ESCAPE '\' OR value LIKE ?1 ESCAPE '\'
        ORDER BY updated_at DESC, id DESC
        LIMIT ?2
        "#,
        query,
        limit,
    )
    .await?;
    rows.iter().map(row_to_fact).collect()
}

async fn search_tasks_in(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<Task>, MemoryError> {
    let rows = fts_or_like(
        conn,
        "tasks",
        r#"
        SELECT t.* FROM tasks_fts
        JOIN tasks t ON t.id = tasks_fts.rowid
        WHERE tasks_fts MATCH ?1
        ORDER BY bm25(tasks_fts), t.id
        LIMIT ?2
        "#,
        r#"
        SELECT * FROM tasks
        WHERE title LIKE ?1 ESCAPE '\'
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
        query,
        limit,
    )
    .await?;
    rows.iter().map(row_to_task).collect()
}

async fn search_documents_in(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<DocumentChunk>, MemoryError> {
    let rows = fts_or_like(
        conn,
        "documents",
        r#"
        SELECT d.* FROM documents_fts
        JOIN documents d ON d.id = documents_fts.rowid
        WHERE documents_fts MATCH ?1
        ORDER BY bm25(documents_fts), d.id
        LIMIT ?2
        "#,
        r#"
        SELECT * FROM documents
        WHERE content LIKE ?1 ESCAPE '\' OR path LIKE ?1 ESCAPE '\'
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
        query,
        limit,
    )
    .await?;
    rows.iter().map(row_to_chunk).collect()
}

async fn open_tasks_in(
    conn: &mut SqliteConnection,
    limit: Option<usize>,
) -> Result<Vec<Task>, MemoryError> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM tasks WHERE status = ?1
        ORDER BY due_at IS NULL, due_at, id
        LIMIT ?2
        "#,
    )
    .bind(TASK_OPEN)
    .bind(limit.map_or(-1, limit_param))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MemoryError::QueryFailed(format!("open tasks: {e}")))?;
    rows.iter().map(row_to_task).collect()
}

async fn count(conn: &mut SqliteConnection, table: &str) -> Result<u64, MemoryError> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("COUNT {table}: {e}")))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

#[async_trait]
impl MemoryStore for SqliteMemory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add_fact(&self, key: &str, value: &str, source: &str) -> Result<i64, MemoryError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(MemoryError::InvalidInput("fact key must not be empty".into()));
        }
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO facts (key, value, source, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                source = excluded.source,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(source)
        .bind(&now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| MemoryError::Storage(format!("fact upsert failed: {e}")))?;

        debug!(id, key, "Stored fact");
        Ok(id)
    }

    async fn get_fact(&self, key: &str) -> Result<Option<Fact>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let row = sqlx::query("SELECT * FROM facts WHERE key = ?1")
            .bind(key.trim())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("get fact: {e}")))?;
        row.as_ref().map(row_to_fact).transpose()
    }

    async fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<Fact>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;
        search_facts_in(conn, query, limit).await
    }

    async fn get_all_facts(&self) -> Result<Vec<Fact>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let rows = sqlx::query("SELECT * FROM facts ORDER BY key")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("all facts: {e}")))?;
        rows.iter().map(row_to_fact).collect()
    }

    async fn delete_fact(&self, id: i64) -> Result<bool, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let result = sqlx::query("DELETE FROM facts WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE fact failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_task(
        &self,
        title: &str,
        due_at: Option<DateTime<Utc>>,
        payload: Option<serde_json::Value>,
    ) -> Result<i64, MemoryError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(MemoryError::InvalidInput("task title must not be empty".into()));
        }
        let payload = payload.unwrap_or_else(|| serde_json::json!({}));
        let payload = serde_json::to_string(&payload)
            .map_err(|e| MemoryError::Storage(format!("payload serialization: {e}")))?;

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, status, due_at, payload, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(title)
        .bind(TASK_OPEN)
        .bind(due_at.map(|d| d.to_rfc3339()))
        .bind(&payload)
        .bind(&now)
        .execute(&mut *conn)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT task failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, "Stored task");
        Ok(id)
    }

    async fn update_task_status(&self, id: i64, status: &str) -> Result<bool, MemoryError> {
        let status = status.trim();
        if status.is_empty() {
            return Err(MemoryError::InvalidInput("task status must not be empty".into()));
        }
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let result = sqlx::query("UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPDATE task failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_open_tasks(&self) -> Result<Vec<Task>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;
        open_tasks_in(conn, None).await
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let rows = sqlx::query("SELECT * FROM tasks ORDER BY id")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("all tasks: {e}")))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn search_tasks(&self, query: &str, limit: usize) -> Result<Vec<Task>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;
        search_tasks_in(conn, query, limit).await
    }

    async fn delete_task(&self, id: i64) -> Result<bool, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE task failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_document(
        &self,
        path: &str,
        content: &str,
        tags: &[String],
    ) -> Result<Vec<i64>, MemoryError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(MemoryError::InvalidInput("document path must not be empty".into()));
        }
        let tags_json = serde_json::to_string(tags)
            .map_err(|e| MemoryError::Storage(format!("Tags serialization: {e}")))?;
        let chunks = chunk_text(
            content,
            self.chunking.max_chars,
            self.chunking.overlap_chars,
        );

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        // Dropping the transaction on any error path rolls it back.
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM documents WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE old chunks failed: {e}")))?;

        let now = Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let result = sqlx::query(
                r#"
                INSERT INTO documents (path, chunk_idx, content, tags, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(path)
            .bind(limit_param(idx))
            .bind(chunk)
            .bind(&tags_json)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("INSERT chunk {idx} failed: {e}")))?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        info!(path, chunks = ids.len(), "Indexed document");
        Ok(ids)
    }

    async fn search_documents(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;
        search_documents_in(conn, query, limit).await
    }

    async fn delete_document(&self, path: &str) -> Result<u64, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let result = sqlx::query("DELETE FROM documents WHERE path = ?1")
            .bind(path.trim())
            .execute(&mut *conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE document failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<String, MemoryError> {
        let per_kind = (top_k / 2).max(1);

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        let facts = search_facts_in(conn, query, per_kind).await?;
        let docs = search_documents_in(conn, query, per_kind).await?;
        let tasks = open_tasks_in(conn, Some(MAX_CONTEXT_TASKS)).await?;

        debug!(
            facts = facts.len(),
            docs = docs.len(),
            tasks = tasks.len(),
            "Retrieved memory context"
        );
        Ok(format_context(&facts, &docs, &tasks))
    }

    async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(MemoryError::Closed)?;

        Ok(MemoryStats {
            facts: count(conn, "facts").await?,
            tasks: count(conn, "tasks").await?,
            document_chunks: count(conn, "documents").await?,
            db_path: self.db_path.clone(),
        })
    }

    async fn close(&self) -> Result<(), MemoryError> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close()
                .await
                .map_err(|e| MemoryError::Storage(format!("close failed: {e}")))?;
            info!(db_path = %self.db_path, "SQLite memory store closed");
        }
        Ok(())
    }
}
