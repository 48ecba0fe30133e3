//! # AI Pilot Core
//!
//! Domain types, traits, and error definitions for the AI Pilot
//! orchestration runtime. Implementations live in their own crates;
//! everything here is plain data or a trait seam.
//!
//! ## Seams
//!
//! - [`LanguageModel`]: the model client the orchestrator drives
//! - [`MemoryStore`]: facts, tasks, and document chunks with retrieval
//! - [`PromptBuilder`]: system prompt assembly
//!
//! All crates depend inward on this one, which keeps the dependency
//! graph acyclic and lets tests swap in scripted fakes.

pub mod error;
pub mod memory;
pub mod message;
pub mod model;
pub mod plan;
pub mod prompt;
pub mod text;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ModelError, ToolError};
pub use memory::{DocumentChunk, Fact, MemoryStats, MemoryStore, Task};
pub use message::{ConversationId, Message, Role};
pub use model::{LanguageModel, TokenStream};
pub use plan::PlanStep;
pub use prompt::PromptBuilder;
pub use tool::{ToolDescriptor, ToolKind, ToolResult};
