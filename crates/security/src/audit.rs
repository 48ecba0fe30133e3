//! Audit trail — buffered, rotating, append-only JSONL records.
//!
//! Two logical streams share one instance:
//! - **events**: tool calls, plan steps, memory operations, errors, lifecycle
//! - **conversations**: one record per user/assistant turn
//!
//! Records are buffered per stream and written once a buffer reaches
//! [`DEFAULT_BUFFER_LINES`], on [`AuditTrail::flush`], or on drop. A
//! stream file that has grown past the rotation threshold is renamed to
//! a timestamped file before the next write. A failed write puts the
//! pending lines back into the buffer, keeping at most
//! [`DEFAULT_MAX_RETAINED_LINES`] per stream.

use chrono::{DateTime, Utc};
use pilot_config::AuditConfig;
use pilot_core::message::{ConversationId, Role};
use pilot_core::plan::PlanStep;
use pilot_core::text::truncate_chars;
use pilot_core::tool::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Lines buffered per stream before an automatic flush.
pub const DEFAULT_BUFFER_LINES: usize = 20;

/// Stream files at or above this size are rotated before the next flush.
pub const DEFAULT_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Lines kept per stream while writes keep failing; older ones are dropped.
pub const DEFAULT_MAX_RETAINED_LINES: usize = 1000;

const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Severity attached to each record and used for the console echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// The two logical streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStream {
    Events,
    Conversations,
}

/// The typed body of a record; `type` is the tag in the JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    Event {
        event: String,
        data: Value,
    },
    ConversationTurn {
        conv_id: String,
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        content_length: usize,
        metadata: Value,
    },
    ToolCall {
        tool_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_preview: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PlanStep {
        step: Value,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One line of a stream file.
#[derive(Debug, Clone, Serialize)]
struct AuditLine<'a> {
    ts: DateTime<Utc>,
    level: AuditLevel,
    #[serde(flatten)]
    record: &'a AuditRecord,
}

/// Line counts and locations of both streams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub enabled: bool,
    pub events_lines: usize,
    pub conversations_lines: usize,
    pub pending_lines: usize,
    pub events_path: String,
    pub conversations_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
struct Buffers {
    events: Vec<String>,
    conversations: Vec<String>,
}

impl Buffers {
    fn get_mut(&mut self, stream: AuditStream) -> &mut Vec<String> {
        match stream {
            AuditStream::Events => &mut self.events,
            AuditStream::Conversations => &mut self.conversations,
        }
    }
}

/// Buffered, rotating audit trail shared by all turns.
pub struct AuditTrail {
    enabled: bool,
    log_prompts: bool,
    log_tool_io: bool,
    events_path: PathBuf,
    conversations_path: PathBuf,
    buffer_lines: usize,
    rotate_bytes: u64,
    max_retained: usize,
    buffers: Mutex<Buffers>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("enabled", &self.enabled)
            .field("events_path", &self.events_path)
            .field("conversations_path", &self.conversations_path)
            .field("pending", &self.pending())
            .finish()
    }
}

impl AuditTrail {
    /// Open a trail from configuration, creating the log directories.
    pub fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        for path in [&config.events_path, &config.conversations_path] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(Self {
            enabled: true,
            log_prompts: config.log_prompts,
            log_tool_io: config.log_tool_io,
            events_path: config.events_path.clone(),
            conversations_path: config.conversations_path.clone(),
            buffer_lines: DEFAULT_BUFFER_LINES,
            rotate_bytes: DEFAULT_ROTATE_BYTES,
            max_retained: DEFAULT_MAX_RETAINED_LINES,
            buffers: Mutex::new(Buffers::default()),
        })
    }

    /// A trail that records nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            log_prompts: false,
            log_tool_io: false,
            events_path: PathBuf::new(),
            conversations_path: PathBuf::new(),
            buffer_lines: DEFAULT_BUFFER_LINES,
            rotate_bytes: DEFAULT_ROTATE_BYTES,
            max_retained: DEFAULT_MAX_RETAINED_LINES,
            buffers: Mutex::new(Buffers::default()),
        }
    }

    /// Override the flush and rotation thresholds.
    pub fn with_thresholds(mut self, buffer_lines: usize, rotate_bytes: u64) -> Self {
        self.buffer_lines = buffer_lines.max(1);
        self.rotate_bytes = rotate_bytes;
        self
    }

    /// Override how many unwritten lines a stream keeps after failed writes.
    pub fn with_retained_limit(mut self, max_lines: usize) -> Self {
        self.max_retained = max_lines.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn path_for(&self, stream: AuditStream) -> &Path {
        match stream {
            AuditStream::Events => &self.events_path,
            AuditStream::Conversations => &self.conversations_path,
        }
    }

    // --- Record kinds ---

    /// Record a named event with arbitrary JSON data.
    pub fn log_event(&self, event: &str, data: Value, level: AuditLevel) {
        self.append(
            AuditStream::Events,
            level,
            AuditRecord::Event {
                event: event.into(),
                data,
            },
        );
    }

    /// Record process startup with a configuration summary.
    pub fn log_startup(&self, summary: Value) {
        self.log_event("pilot_startup", summary, AuditLevel::Info);
    }

    /// Record one conversation turn. Raw content is kept only when prompt
    /// logging is enabled; otherwise just its length.
    pub fn log_conversation_turn(
        &self,
        conv_id: &ConversationId,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) {
        let record = AuditRecord::ConversationTurn {
            conv_id: conv_id.to_string(),
            role: role.as_str().into(),
            content: self.log_prompts.then(|| content.to_string()),
            content_length: content.chars().count(),
            metadata: metadata.unwrap_or_else(|| Value::Object(Map::new())),
        };
        self.append(AuditStream::Conversations, AuditLevel::Info, record);
    }

    /// Record a tool invocation. Parameters, output preview and error text
    /// are kept only when tool I/O logging is enabled.
    pub fn log_tool_call(&self, params: &Map<String, Value>, result: &ToolResult) {
        let io = self.log_tool_io;
        let record = AuditRecord::ToolCall {
            tool_id: result.tool_id().into(),
            success: result.success(),
            params: io.then(|| Value::Object(params.clone())),
            output_preview: io.then(|| truncate_chars(result.output(), OUTPUT_PREVIEW_CHARS).to_string()),
            error: (io && !result.success()).then(|| result.error().to_string()),
        };
        let level = if result.success() { AuditLevel::Info } else { AuditLevel::Warn };
        self.append(AuditStream::Events, level, record);
    }

    /// Record a parsed plan step (never its raw model output).
    pub fn log_plan_step(&self, step: &PlanStep) {
        let mut value = serde_json::to_value(step).unwrap_or(Value::Null);
        if !self.log_tool_io
            && let Value::Object(map) = &mut value
        {
            map.remove("action_params");
            map.insert("observation".into(), Value::Null);
            map.insert("observation_length".into(), json!(step.observation.chars().count()));
        }
        self.append(AuditStream::Events, AuditLevel::Debug, AuditRecord::PlanStep { step: value });
    }

    /// Record a memory write or lookup.
    pub fn log_memory_op(&self, operation: &str, details: Value) {
        self.log_event(&format!("memory_{operation}"), details, AuditLevel::Debug);
    }

    /// Record an error with an optional underlying cause.
    pub fn log_error(&self, message: &str, error: Option<&dyn std::error::Error>) {
        let record = AuditRecord::Error {
            message: message.into(),
            error: error.map(|e| e.to_string()),
        };
        self.append(AuditStream::Events, AuditLevel::Error, record);
    }

    // --- Buffering ---

    fn append(&self, stream: AuditStream, level: AuditLevel, record: AuditRecord) {
        if !self.enabled {
            return;
        }
        echo(level, &record);

        let line = AuditLine {
            ts: Utc::now(),
            level,
            record: &record,
        };
        let line = match serde_json::to_string(&line) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Audit record not serializable: {e}");
                return;
            }
        };

        let mut buffers = self.lock();
        let pending = buffers.get_mut(stream);
        pending.push(line);
        if pending.len() >= self.buffer_lines
            && let Err(e) = self.flush_stream(&mut buffers, stream)
        {
            tracing::warn!("Audit flush failed, keeping lines buffered: {e}");
        }
    }

    /// Write both buffers to disk.
    pub fn flush(&self) -> Result<(), AuditError> {
        if !self.enabled {
            return Ok(());
        }
        let mut buffers = self.lock();
        let events = self.flush_stream(&mut buffers, AuditStream::Events);
        let conversations = self.flush_stream(&mut buffers, AuditStream::Conversations);
        events.and(conversations)
    }

    /// Flush everything pending; used on shutdown.
    pub fn close(&self) -> Result<(), AuditError> {
        self.flush()
    }

    fn flush_stream(&self, buffers: &mut Buffers, stream: AuditStream) -> Result<(), AuditError> {
        let pending = buffers.get_mut(stream);
        if pending.is_empty() {
            return Ok(());
        }
        let lines = std::mem::take(pending);
        let path = self.path_for(stream);

        match self.write_lines(path, &lines) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Anything appended meanwhile goes after the restored lines.
                let newer = std::mem::replace(buffers.get_mut(stream), lines);
                let pending = buffers.get_mut(stream);
                pending.extend(newer);
                let excess = pending.len().saturating_sub(self.max_retained);
                if excess > 0 {
                    pending.drain(..excess);
                    tracing::warn!(
                        path = %path.display(),
                        dropped = excess,
                        "Audit buffer full, dropped oldest unwritten lines"
                    );
                }
                Err(e)
            }
        }
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> Result<(), AuditError> {
        self.rotate_if_needed(path)?;

        let io_err = |source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        let mut payload = lines.join("\n");
        payload.push('\n');
        file.write_all(payload.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)
    }

    fn rotate_if_needed(&self, path: &Path) -> Result<(), AuditError> {
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(());
        };
        if !meta.is_file() || meta.len() < self.rotate_bytes {
            return Ok(());
        }
        let rotated = rotated_name(path, Utc::now());
        std::fs::rename(path, &rotated).map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(from = %path.display(), to = %rotated.display(), "Rotated audit log");
        Ok(())
    }

    /// Number of records waiting in memory.
    pub fn pending(&self) -> usize {
        let buffers = self.lock();
        buffers.events.len() + buffers.conversations.len()
    }

    // --- Reading ---

    /// The last `n` flushed event records.
    pub fn read_recent_events(&self, n: usize) -> Result<Vec<Value>, AuditError> {
        read_tail(&self.events_path, n)
    }

    /// The last `n` flushed conversation records.
    pub fn read_recent_conversations(&self, n: usize) -> Result<Vec<Value>, AuditError> {
        read_tail(&self.conversations_path, n)
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enabled: self.enabled,
            events_lines: count_lines(&self.events_path),
            conversations_lines: count_lines(&self.conversations_path),
            pending_lines: self.pending(),
            events_path: self.events_path.display().to_string(),
            conversations_path: self.conversations_path.display().to_string(),
        }
    }
}

impl Drop for AuditTrail {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("Audit flush on drop failed: {e}");
        }
    }
}

fn echo(level: AuditLevel, record: &AuditRecord) {
    let kind = match record {
        AuditRecord::Event { event, .. } => event.as_str(),
        AuditRecord::ConversationTurn { .. } => "conversation_turn",
        AuditRecord::ToolCall { .. } => "tool_call",
        AuditRecord::PlanStep { .. } => "plan_step",
        AuditRecord::Error { .. } => "error",
    };
    match level {
        AuditLevel::Debug => tracing::debug!(kind, "AUDIT"),
        AuditLevel::Info => tracing::info!(kind, "AUDIT"),
        AuditLevel::Warn => tracing::warn!(kind, record = ?record, "AUDIT"),
        AuditLevel::Error => tracing::error!(kind, record = ?record, "AUDIT"),
    }
}

fn rotated_name(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audit".into());
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jsonl".into());
    path.with_file_name(format!("{stem}.{}.{ext}", now.format("%Y%m%d_%H%M%S_%3f")))
}

fn read_tail(path: &Path, n: usize) -> Result<Vec<Value>, AuditError> {
    if n == 0 || !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..]
        .iter()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

fn count_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|c| c.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> AuditConfig {
        AuditConfig {
            enabled: true,
            log_prompts: false,
            log_tool_io: true,
            events_path: dir.join("logs").join("events.jsonl"),
            conversations_path: dir.join("logs").join("conversations.jsonl"),
        }
    }

    #[test]
    fn buffers_until_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::from_config(&config(dir.path()))
            .unwrap()
            .with_thresholds(3, DEFAULT_ROTATE_BYTES);

        trail.log_event("a", json!({}), AuditLevel::Info);
        trail.log_event("b", json!({}), AuditLevel::Info);
        assert_eq!(trail.pending(), 2);
        assert!(trail.read_recent_events(10).unwrap().is_empty());

        trail.log_event("c", json!({"n": 3}), AuditLevel::Info);
        assert_eq!(trail.pending(), 0);
        let events = trail.read_recent_events(10).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2]["type"], "event");
        assert_eq!(events[2]["event"], "c");
        assert_eq!(events[2]["data"]["n"], 3);
        assert_eq!(events[2]["level"], "info");
    }

    #[test]
    fn explicit_flush_writes_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::from_config(&config(dir.path())).unwrap();
        let conv = ConversationId::from("c1");

        trail.log_conversation_turn(&conv, Role::User, "ciao", None);
        trail.log_error("boom", None);
        trail.flush().unwrap();

        let turns = trail.read_recent_conversations(5).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["type"], "conversation_turn");
        assert_eq!(turns[0]["conv_id"], "c1");
        assert_eq!(turns[0]["content_length"], 4);
        assert!(turns[0].get("content").is_none());

        let events = trail.read_recent_events(5).unwrap();
        assert_eq!(events[0]["type"], "error");
        assert_eq!(trail.stats().events_lines, 1);
    }

    #[test]
    fn prompts_logged_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.log_prompts = true;
        let trail = AuditTrail::from_config(&cfg).unwrap();
        trail.log_conversation_turn(&ConversationId::from("c"), Role::User, "mi chiamo Marco", None);
        trail.flush().unwrap();
        let turns = trail.read_recent_conversations(1).unwrap();
        assert_eq!(turns[0]["content"], "mi chiamo Marco");
    }

    #[test]
    fn tool_io_gated_by_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.log_tool_io = false;
        let trail = AuditTrail::from_config(&cfg).unwrap();

        let mut params = Map::new();
        params.insert("path".into(), json!("secret.txt"));
        trail.log_tool_call(&params, &ToolResult::failure("fs", "not found"));

        let mut step = PlanStep::new(1, "raw");
        step.action = Some("fs".into());
        step.action_params = params.clone();
        step.observation = "file body".into();
        trail.log_plan_step(&step);
        trail.flush().unwrap();

        let events = trail.read_recent_events(5).unwrap();
        assert_eq!(events[0]["tool_id"], "fs");
        assert_eq!(events[0]["success"], false);
        assert!(events[0].get("params").is_none());
        assert!(events[0].get("error").is_none());
        assert!(events[1]["step"]["observation"].is_null());
        assert_eq!(events[1]["step"]["observation_length"], 9);
        assert!(events[1]["step"].get("action_params").is_none());
        assert!(events[1]["step"].get("raw_output").is_none());
    }

    #[test]
    fn tool_output_preview_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::from_config(&config(dir.path())).unwrap();
        trail.log_tool_call(&Map::new(), &ToolResult::ok("py", "x".repeat(2000)));
        trail.flush().unwrap();
        let events = trail.read_recent_events(1).unwrap();
        assert_eq!(events[0]["output_preview"].as_str().unwrap().len(), OUTPUT_PREVIEW_CHARS);
    }

    #[test]
    fn failed_flush_keeps_lines() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let trail = AuditTrail::from_config(&cfg).unwrap();
        // A directory where the events file should be makes the open fail.
        std::fs::create_dir_all(&cfg.events_path).unwrap();

        trail.log_event("kept", json!({}), AuditLevel::Info);
        assert!(trail.flush().is_err());
        assert_eq!(trail.pending(), 1);

        std::fs::remove_dir(&cfg.events_path).unwrap();
        trail.flush().unwrap();
        assert_eq!(trail.pending(), 0);
        assert_eq!(trail.read_recent_events(5).unwrap()[0]["event"], "kept");
    }

    #[test]
    fn failing_writes_keep_only_the_newest_lines() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let trail = AuditTrail::from_config(&cfg)
            .unwrap()
            .with_thresholds(2, DEFAULT_ROTATE_BYTES)
            .with_retained_limit(5);
        std::fs::create_dir_all(&cfg.events_path).unwrap();

        for n in 0..50 {
            trail.log_event("e", json!({"n": n}), AuditLevel::Info);
            assert!(trail.pending() <= 5, "{} pending after {n}", trail.pending());
        }

        std::fs::remove_dir(&cfg.events_path).unwrap();
        trail.flush().unwrap();
        let kept = trail.read_recent_events(50).unwrap();
        assert!(kept.len() <= 5);
        assert_eq!(kept.last().unwrap()["data"]["n"], 49);
    }

    #[test]
    fn rotates_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let trail = AuditTrail::from_config(&cfg).unwrap().with_thresholds(1, 100);

        trail.log_event("first", json!({"pad": "x".repeat(200)}), AuditLevel::Info);
        trail.log_event("second", json!({}), AuditLevel::Info);

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("events."))
            .collect();
        assert_eq!(logs.len(), 2, "{logs:?}");

        let current = trail.read_recent_events(5).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0]["event"], "second");
    }

    #[test]
    fn drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        {
            let trail = AuditTrail::from_config(&cfg).unwrap();
            trail.log_startup(json!({"model": "test"}));
        }
        let content = std::fs::read_to_string(&cfg.events_path).unwrap();
        assert!(content.contains("pilot_startup"));
    }

    #[test]
    fn disabled_trail_records_nothing() {
        let trail = AuditTrail::disabled();
        trail.log_event("x", json!({}), AuditLevel::Info);
        assert_eq!(trail.pending(), 0);
        assert!(trail.flush().is_ok());
        assert!(!trail.stats().enabled);
    }

    #[test]
    fn memory_ops_are_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::from_config(&config(dir.path())).unwrap();
        trail.log_memory_op("add_fact", json!({"key": "name"}));
        trail.flush().unwrap();
        let events = trail.read_recent_events(1).unwrap();
        assert_eq!(events[0]["event"], "memory_add_fact");
        assert_eq!(events[0]["level"], "debug");
    }

    #[test]
    fn rotated_name_keeps_extension() {
        let now = DateTime::parse_from_rfc3339("2026-10-19T10:11:12.345Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = rotated_name(Path::new("/logs/events.jsonl"), now);
        assert_eq!(name, PathBuf::from("/logs/events.20261019_101112_345.jsonl"));
    }
}
