//! Structured memory implementations for AI Pilot.
//!
//! - [`SqliteMemory`]: the durable store, one SQLite file with FTS5 indexes
//! - [`NoopMemory`]: stores nothing; used when the database cannot be opened
//!
//! Chunking, query sanitization, and context formatting are plain
//! functions so they can be tested without a database.

pub mod chunk;
pub mod context;
pub mod fts;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunk::{ChunkConfig, chunk_text};
pub use context::format_context;
pub use fts::sanitize_fts_query;
pub use noop::NoopMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMemory;
