//! Configuration loading, validation, and typed accessors for AI Pilot.
//!
//! Loads a single TOML file (usually `pilot.toml`). Every key has a
//! default, so an empty or missing file yields a working configuration.
//! Validation runs once at load time; the rest of the runtime treats a
//! [`PilotConfig`] as read-only.

use pilot_core::tool::{ToolDescriptor, ToolKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default)]
    pub meta: MetaConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub policies: PoliciesConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    /// Tool registry. Omitting `[[tools]]` entirely keeps the built-in set.
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolConfig>,

    /// Where this config was loaded from, if anywhere.
    #[serde(skip)]
    source: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_description")]
    pub description: String,
}

fn default_name() -> String {
    "AI Pilot".into()
}
fn default_version() -> String {
    "1.0".into()
}
fn default_description() -> String {
    "Local assistant with tools, memory and step-by-step planning".into()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            description: default_description(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Model identifier reported in status output.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Hard wall-clock limit for subprocess-backed tools.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Limit for one model completion, and for the gap between two
    /// streamed tokens.
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    /// Maximum tool invocations per turn.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,

    /// Persona instructions appended to every system prompt.
    #[serde(default)]
    pub extra_instructions: String,
}

fn default_model_id() -> String {
    "llama3.2".into()
}
fn default_tool_timeout_ms() -> u64 {
    45_000
}
fn default_model_timeout_ms() -> u64 {
    120_000
}
fn default_max_tool_calls() -> usize {
    12
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            tool_timeout_ms: default_tool_timeout_ms(),
            model_timeout_ms: default_model_timeout_ms(),
            max_tool_calls: default_max_tool_calls(),
            extra_instructions: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliciesConfig {
    /// Redact credential-like substrings from answers.
    #[serde(default = "default_true")]
    pub redact_secrets: bool,

    /// Allow the restricted-command tool kind to run at all.
    #[serde(default)]
    pub allow_shell: bool,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            redact_secrets: true,
            allow_shell: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,

    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/memory.sqlite")
}
fn default_top_k() -> usize {
    5
}
fn default_chunk_max_chars() -> usize {
    2000
}
fn default_chunk_overlap_chars() -> usize {
    200
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
            retrieval_top_k: default_top_k(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_overlap_chars: default_chunk_overlap_chars(),
        }
    }
}

/// How the orchestrator decides between a direct answer and a ReAct loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStrategy {
    /// Never plan; always answer directly.
    Simple,
    /// Thought / Action / Observation loop.
    React,
    /// Accepted for compatibility; runs the ReAct loop.
    TreeOfThought,
}

impl PlannerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannerStrategy::Simple => "simple",
            PlannerStrategy::React => "react",
            PlannerStrategy::TreeOfThought => "tree_of_thought",
        }
    }

    /// Whether this strategy ever runs the ReAct loop.
    pub fn plans(&self) -> bool {
        !matches!(self, PlannerStrategy::Simple)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_strategy")]
    pub strategy: PlannerStrategy,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_strategy() -> PlannerStrategy {
    PlannerStrategy::React
}
fn default_max_steps() -> usize {
    12
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory every filesystem, code, and command tool is confined to.
    #[serde(default = "default_fs_root")]
    pub fs_root: PathBuf,

    /// Interpreter used by code-kind tools.
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_fs_root() -> PathBuf {
    PathBuf::from("./workspace")
}
fn default_python() -> String {
    if cfg!(target_os = "windows") {
        "python".into()
    } else {
        "python3".into()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fs_root: default_fs_root(),
            python: default_python(),
        }
    }
}

/// Routing decision for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    Auto,
    /// Treated like `Auto`: the core has no confirmation channel.
    Confirm,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_policy")]
    pub default_policy: ToolPolicy,

    /// Per-tool overrides, keyed by tool id. These win over `default_policy`.
    #[serde(default)]
    pub per_tool: HashMap<String, ToolPolicy>,
}

fn default_policy() -> ToolPolicy {
    ToolPolicy::Auto
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_policy: default_policy(),
            per_tool: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Record raw message text instead of its length.
    #[serde(default)]
    pub log_prompts: bool,

    /// Record tool parameters and output previews.
    #[serde(default = "default_true")]
    pub log_tool_io: bool,

    #[serde(default = "default_events_path")]
    pub events_path: PathBuf,

    #[serde(default = "default_conversations_path")]
    pub conversations_path: PathBuf,
}

fn default_events_path() -> PathBuf {
    PathBuf::from("./data/logs/events.jsonl")
}
fn default_conversations_path() -> PathBuf {
    PathBuf::from("./data/logs/conversations.jsonl")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_prompts: false,
            log_tool_io: true,
            events_path: default_events_path(),
            conversations_path: default_conversations_path(),
        }
    }
}

/// One entry of the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Name the model uses in `Action: id(...)`.
    pub id: String,

    pub kind: ToolKind,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filesystem kind only: permit the `write` action.
    #[serde(default)]
    pub allow_write: bool,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,
}

fn default_max_output_chars() -> usize {
    10_000
}
fn default_max_read_bytes() -> u64 {
    50_000
}

impl ToolConfig {
    pub fn new(id: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: String::new(),
            description: String::new(),
            enabled: true,
            allow_write: false,
            max_output_chars: default_max_output_chars(),
            max_read_bytes: default_max_read_bytes(),
        }
    }

    pub fn with_description(mut self, name: &str, description: &str) -> Self {
        self.name = name.into();
        self.description = description.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn allow_write(mut self, allow: bool) -> Self {
        self.allow_write = allow;
        self
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: self.id.clone(),
            name: if self.name.is_empty() { self.id.clone() } else { self.name.clone() },
            description: self.description.clone(),
            kind: self.kind,
        }
    }
}

/// The built-in registry: files, code, commands (off), memory.
pub fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new("fs", ToolKind::Filesystem).with_description(
            "Filesystem",
            "List, read or write files in the workspace. Params: {\"action\": \"list|read|write\", \"path\": \"...\", \"content\": \"...\"}",
        ),
        ToolConfig::new("py", ToolKind::Code).with_description(
            "Python",
            "Run a short Python snippet and return what it prints. Params: {\"code\": \"...\"}",
        ),
        ToolConfig::new("sh", ToolKind::Shell)
            .with_description(
                "Shell",
                "Run a read-only command (ls, cat, grep, ...). Params: {\"command\": \"...\"}",
            )
            .enabled(false),
        ToolConfig::new("db", ToolKind::Memory).with_description(
            "Memory",
            "Search memory or store a fact. Params: {\"action\": \"search\", \"query\": \"...\"} or {\"action\": \"add_fact\", \"key\": \"...\", \"value\": \"...\"}",
        ),
    ]
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl PilotConfig {
    /// Load configuration from a file path.
    ///
    /// A missing file yields the defaults (still remembering `path` so a
    /// later reload picks up a file created in the meantime).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            let mut config = Self::default();
            config.source = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The file this config was loaded from.
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planner.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "planner.max_steps must be at least 1".into(),
            ));
        }
        if self.runtime.tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.tool_timeout_ms must be > 0".into(),
            ));
        }
        if self.runtime.model_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.model_timeout_ms must be > 0".into(),
            ));
        }
        if self.memory.chunk_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "memory.chunk_max_chars must be > 0".into(),
            ));
        }
        if self.memory.retrieval_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "memory.retrieval_top_k must be > 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("tool id must not be empty".into()));
            }
            if !seen.insert(tool.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate tool id '{}'",
                    tool.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a tool by id.
    pub fn tool(&self, id: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Effective routing policy for a tool id (per-tool override first).
    pub fn tool_policy(&self, id: &str) -> ToolPolicy {
        self.routing
            .per_tool
            .get(id)
            .copied()
            .unwrap_or(self.routing.default_policy)
    }

    /// Whether a tool may run: enabled and not routed to `never`.
    pub fn is_tool_available(&self, tool: &ToolConfig) -> bool {
        tool.enabled && self.tool_policy(&tool.id) != ToolPolicy::Never
    }

    /// Tools the model may call this turn, in registry order.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .filter(|t| self.is_tool_available(t))
            .map(ToolConfig::descriptor)
            .collect()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.tool_timeout_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.model_timeout_ms)
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            runtime: RuntimeConfig::default(),
            policies: PoliciesConfig::default(),
            memory: MemoryConfig::default(),
            planner: PlannerConfig::default(),
            sandbox: SandboxConfig::default(),
            routing: RoutingConfig::default(),
            audit: AuditConfig::default(),
            tools: default_tools(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PilotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.planner.strategy, PlannerStrategy::React);
        assert_eq!(config.planner.max_steps, 12);
        assert_eq!(config.runtime.tool_timeout_ms, 45_000);
        assert_eq!(config.model_timeout(), Duration::from_secs(120));
        assert!(config.policies.redact_secrets);
        assert!(!config.policies.allow_shell);
        assert!(!config.audit.log_prompts);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = PilotConfig::from_toml_str("").unwrap();
        assert_eq!(config.tools.len(), 4);
        assert_eq!(config.memory.retrieval_top_k, 5);
    }

    #[test]
    fn parse_custom_sections() {
        let toml_str = r#"
[planner]
strategy = "simple"
max_steps = 3

[routing]
default_policy = "auto"
per_tool = { py = "never" }

[[tools]]
id = "files"
kind = "filesystem"
allow_write = true

[[tools]]
id = "py"
kind = "python"
"#;
        let config = PilotConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.planner.strategy, PlannerStrategy::Simple);
        assert!(!config.planner.strategy.plans());
        assert_eq!(config.tools.len(), 2);
        assert!(config.tool("files").unwrap().allow_write);
        assert_eq!(config.tool("py").unwrap().kind, ToolKind::Code);
        assert_eq!(config.tool_policy("py"), ToolPolicy::Never);
        assert_eq!(config.tool_policy("files"), ToolPolicy::Auto);
    }

    #[test]
    fn available_tools_skip_disabled_and_blocked() {
        let mut config = PilotConfig::default();
        config.routing.per_tool.insert("py".into(), ToolPolicy::Never);
        let ids: Vec<String> = config.available_tools().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["fs".to_string(), "db".to_string()]);
    }

    #[test]
    fn duplicate_tool_ids_rejected() {
        let mut config = PilotConfig::default();
        config.tools.push(ToolConfig::new("fs", ToolKind::Filesystem));
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn zero_max_steps_rejected() {
        let mut config = PilotConfig::default();
        config.planner.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = PilotConfig::load_from(Path::new("/nonexistent/pilot.toml")).unwrap();
        assert_eq!(config.meta.name, "AI Pilot");
        assert_eq!(config.source_path(), Some(Path::new("/nonexistent/pilot.toml")));
    }

    #[test]
    fn load_from_file_remembers_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.toml");
        std::fs::write(&path, "[runtime]\nmax_tool_calls = 2\n").unwrap();
        let config = PilotConfig::load_from(&path).unwrap();
        assert_eq!(config.runtime.max_tool_calls, 2);
        assert_eq!(config.source_path(), Some(path.as_path()));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.toml");
        std::fs::write(&path, "[planner\nmax_steps = ").unwrap();
        let err = PilotConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("pilot.toml"));
    }

    #[test]
    fn default_toml_roundtrips() {
        let toml_str = PilotConfig::default_toml();
        let parsed = PilotConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.tools.len(), 4);
        assert_eq!(parsed.planner.strategy, PlannerStrategy::React);
    }
}
