//! Security module for AI Pilot: sandbox paths, redaction, and audit.
//!
//! Provides:
//! - **Path resolution**: confine every tool path to the sandbox root
//! - **Redaction**: scrub credentials from answers and host paths from stderr
//! - **Audit trail**: buffered, rotating JSONL records of every turn

pub mod audit;
pub mod path;
pub mod redact;

pub use audit::{AuditError, AuditLevel, AuditRecord, AuditStats, AuditStream, AuditTrail};
pub use path::{PathValidationError, prepare_root, resolve_in_sandbox};
pub use redact::{redact_secrets, sanitize_stderr};
