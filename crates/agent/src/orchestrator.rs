//! The pilot: single entry point for a user turn.
//!
//! A turn always goes the same way: log the user message, retrieve
//! memory context, build the system prompt, then either answer directly
//! or run the ReAct loop. The answer is post-processed, the assistant
//! turn is logged, and fact extraction is spawned in the background.
//!
//! Configuration, executor and prompt builder form one immutable
//! [`Runtime`] snapshot. A reload swaps the snapshot; turns already in
//! flight finish on the one they started with.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use pilot_config::PilotConfig;
use pilot_core::error::{Error, MemoryError, ModelError, ToolError};
use pilot_core::memory::{Fact, MemoryStats, MemoryStore, Task};
use pilot_core::message::{ConversationId, Message, Role};
use pilot_core::model::LanguageModel;
use pilot_core::plan::PlanStep;
use pilot_core::prompt::PromptBuilder;
use pilot_memory::{ChunkConfig, NoopMemory, SqliteMemory};
use pilot_security::{AuditLevel, AuditStats, AuditTrail};
use pilot_tools::SandboxExecutor;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::extraction::{MIN_EXTRACTION_CHARS, extract_and_store};
use crate::model_call::{generate_within, next_token, open_stream_within};
use crate::planner::{MAX_CONTEXT_CHARS, ReactPlanner, trim_context};
use crate::postprocess::{
    FALLBACK_ANSWER, GENERATION_ERROR_ANSWER, StreamingPostProcessor, post_process,
};
use crate::prompt::DefaultPromptBuilder;
use crate::stream::{STREAM_CHUNK_CHARS, word_chunks};

const STREAM_CHANNEL_CAPACITY: usize = 64;

/// What happened during a turn, returned next to the answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnMetadata {
    pub used_planning: bool,
    pub steps: Vec<PlanStep>,
    pub tools_called: Vec<String>,
    pub memory_retrieved: bool,
    /// Model failure, if the answer is a fallback because of one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnMetadata {
    /// The audit view: step count rather than step bodies.
    fn summary(&self) -> Value {
        json!({
            "used_planning": self.used_planning,
            "steps": self.steps.len(),
            "tools_called": self.tools_called,
            "memory_retrieved": self.memory_retrieved,
            "error": self.error,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PilotResponse {
    pub answer: String,
    pub metadata: TurnMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct PilotStatus {
    pub name: String,
    pub version: String,
    pub model: String,
    pub planner: String,
    pub tools: Vec<String>,
    pub memory: MemoryStats,
    pub audit: AuditStats,
}

/// Immutable per-config state shared by the turns that started under it.
struct Runtime {
    config: Arc<PilotConfig>,
    executor: Arc<SandboxExecutor>,
    prompts: Arc<dyn PromptBuilder>,
}

impl Runtime {
    fn new(
        config: Arc<PilotConfig>,
        memory: Arc<dyn MemoryStore>,
        custom_prompts: Option<Arc<dyn PromptBuilder>>,
    ) -> Result<Self, ToolError> {
        let executor = SandboxExecutor::new(config.clone())?.with_memory(memory);
        let prompts = custom_prompts
            .unwrap_or_else(|| Arc::new(DefaultPromptBuilder::from_config(&config)));
        Ok(Self {
            config,
            executor: Arc::new(executor),
            prompts,
        })
    }
}

/// Per-turn ingredients shared by the blocking and streaming paths.
struct Turn {
    system_prompt: String,
    planner: ReactPlanner,
    metadata: TurnMetadata,
}

struct PilotInner {
    runtime: RwLock<Arc<Runtime>>,
    model: Arc<dyn LanguageModel>,
    memory: Arc<dyn MemoryStore>,
    audit: Arc<AuditTrail>,
    custom_prompts: Option<Arc<dyn PromptBuilder>>,
    background: Mutex<JoinSet<()>>,
}

/// Assembles a [`Pilot`] from configuration and injected collaborators.
///
/// Memory and audit trail are opened from the configuration unless
/// provided. A memory database that cannot be opened degrades to
/// [`NoopMemory`]; an audit directory that cannot be created degrades
/// to a disabled trail.
pub struct PilotBuilder {
    config: PilotConfig,
    model: Arc<dyn LanguageModel>,
    memory: Option<Arc<dyn MemoryStore>>,
    audit: Option<Arc<AuditTrail>>,
    prompts: Option<Arc<dyn PromptBuilder>>,
}

impl PilotBuilder {
    pub fn new(config: PilotConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            model,
            memory: None,
            audit: None,
            prompts: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace the default prompt builder. Survives config reloads.
    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub async fn build(self) -> Result<Pilot, Error> {
        self.config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let memory = match self.memory {
            Some(memory) => memory,
            None => open_memory(&self.config).await,
        };
        let audit = match self.audit {
            Some(audit) => audit,
            None => Arc::new(open_audit(&self.config)),
        };

        let config = Arc::new(self.config);
        let runtime = Runtime::new(config.clone(), memory.clone(), self.prompts.clone())?;

        audit.log_startup(json!({
            "name": config.meta.name,
            "version": config.meta.version,
            "model": self.model.name(),
            "planner": config.planner.strategy.as_str(),
            "memory": memory.name(),
            "sandbox_root": runtime.executor.root().display().to_string(),
            "tools": config.available_tools().iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
        }));
        info!(
            name = %config.meta.name,
            model = self.model.name(),
            planner = config.planner.strategy.as_str(),
            memory = memory.name(),
            "Pilot ready"
        );

        Ok(Pilot {
            inner: Arc::new(PilotInner {
                runtime: RwLock::new(Arc::new(runtime)),
                model: self.model,
                memory,
                audit,
                custom_prompts: self.prompts,
                background: Mutex::new(JoinSet::new()),
            }),
        })
    }
}

async fn open_memory(config: &PilotConfig) -> Arc<dyn MemoryStore> {
    if !config.memory.enabled {
        info!("Memory disabled by configuration");
        return Arc::new(NoopMemory);
    }
    match SqliteMemory::open(&config.memory.db_path).await {
        Ok(store) => Arc::new(store.with_chunking(ChunkConfig {
            max_chars: config.memory.chunk_max_chars,
            overlap_chars: config.memory.chunk_overlap_chars,
        })),
        Err(e) => {
            warn!(
                path = %config.memory.db_path.display(),
                "Memory store unavailable, continuing without persistence: {e}"
            );
            Arc::new(NoopMemory)
        }
    }
}

fn open_audit(config: &PilotConfig) -> AuditTrail {
    AuditTrail::from_config(&config.audit).unwrap_or_else(|e| {
        warn!("Audit trail unavailable, continuing without it: {e}");
        AuditTrail::disabled()
    })
}

/// The orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Pilot {
    inner: Arc<PilotInner>,
}

impl Pilot {
    pub fn builder(config: PilotConfig, model: Arc<dyn LanguageModel>) -> PilotBuilder {
        PilotBuilder::new(config, model)
    }

    fn runtime(&self) -> Arc<Runtime> {
        self.inner
            .runtime
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn background(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The configuration snapshot new turns will use.
    pub fn config(&self) -> Arc<PilotConfig> {
        self.runtime().config.clone()
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.inner.audit
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.inner.memory
    }

    // --- Turns ---

    /// Answer one user message. Never fails: model errors become a
    /// fallback answer with `metadata.error` set.
    pub async fn process(
        &self,
        message: &str,
        history: &[Message],
        conv_id: &ConversationId,
    ) -> PilotResponse {
        let runtime = self.runtime();
        let Turn {
            system_prompt,
            planner,
            mut metadata,
        } = self.prepare_turn(&runtime, message, conv_id).await;

        let raw = if metadata.used_planning {
            self.run_react_loop(&runtime, planner, message, history, &system_prompt, &mut metadata)
                .await
        } else {
            let limit = runtime.config.model_timeout();
            match generate_within(self.inner.model.as_ref(), message, history, &system_prompt, limit)
                .await
            {
                Ok(text) => text,
                Err(e) => self.generation_failed(&e, &mut metadata),
            }
        };

        let answer = finish_answer(&runtime, &raw);
        self.complete_turn(&runtime, message, conv_id, &answer, &metadata);
        PilotResponse { answer, metadata }
    }

    /// Answer one user message as a stream of text chunks.
    ///
    /// With planning, the whole loop runs first and only the final
    /// answer is streamed. Without, model tokens are post-processed line
    /// by line as they arrive. Logging and fact extraction happen even
    /// if the receiver is dropped early.
    pub fn process_stream(
        &self,
        message: impl Into<String>,
        history: Vec<Message>,
        conv_id: ConversationId,
        images: Vec<String>,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let pilot = self.clone();
        let message = message.into();
        tokio::spawn(async move {
            pilot.stream_turn(message, history, conv_id, images, tx).await;
        });
        rx
    }

    async fn stream_turn(
        &self,
        message: String,
        history: Vec<Message>,
        conv_id: ConversationId,
        images: Vec<String>,
        tx: mpsc::Sender<String>,
    ) {
        let runtime = self.runtime();
        let Turn {
            system_prompt,
            planner,
            mut metadata,
        } = self.prepare_turn(&runtime, &message, &conv_id).await;

        let answer = if metadata.used_planning {
            let raw = self
                .run_react_loop(&runtime, planner, &message, &history, &system_prompt, &mut metadata)
                .await;
            let answer = finish_answer(&runtime, &raw);
            for chunk in word_chunks(&answer, STREAM_CHUNK_CHARS) {
                if tx.send(chunk).await.is_err() {
                    debug!("Stream receiver dropped");
                    break;
                }
            }
            answer
        } else {
            self.stream_direct(&runtime, &message, &history, &system_prompt, &images, &tx, &mut metadata)
                .await
        };

        self.complete_turn(&runtime, &message, &conv_id, &answer, &metadata);
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_direct(
        &self,
        runtime: &Runtime,
        message: &str,
        history: &[Message],
        system_prompt: &str,
        images: &[String],
        tx: &mpsc::Sender<String>,
        metadata: &mut TurnMetadata,
    ) -> String {
        let redact = runtime.config.policies.redact_secrets;
        let limit = runtime.config.model_timeout();
        let mut tokens = match open_stream_within(
            self.inner.model.as_ref(),
            message,
            history,
            system_prompt,
            images,
            limit,
        )
        .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                let answer = self.generation_failed(&e, metadata);
                let _ = tx.send(answer.clone()).await;
                return answer;
            }
        };

        let mut processor = StreamingPostProcessor::new(redact);
        let mut raw = String::new();
        let mut receiver_open = true;
        let mut emitted = false;

        while let Some(token) = next_token(&mut tokens, limit).await {
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    warn!("Model stream interrupted: {e}");
                    self.inner.audit.log_error("model stream interrupted", Some(&e));
                    metadata.error = Some(e.to_string());
                    break;
                }
            };
            raw.push_str(&token);
            let out = processor.push(&token);
            if receiver_open && !out.is_empty() {
                emitted = true;
                if tx.send(out).await.is_err() {
                    debug!("Stream receiver dropped, draining model output");
                    receiver_open = false;
                }
            }
        }

        let tail = processor.finish();
        if receiver_open && !tail.is_empty() {
            emitted = true;
            let _ = tx.send(tail).await;
        }

        let answer = post_process(&raw, redact);
        if !answer.is_empty() {
            return answer;
        }
        let fallback = if metadata.error.is_some() {
            GENERATION_ERROR_ANSWER
        } else {
            FALLBACK_ANSWER
        };
        if receiver_open && !emitted {
            let _ = tx.send(fallback.to_string()).await;
        }
        fallback.to_string()
    }

    async fn prepare_turn(&self, runtime: &Runtime, message: &str, conv_id: &ConversationId) -> Turn {
        let audit = &self.inner.audit;
        audit.log_conversation_turn(conv_id, Role::User, message, None);

        let memory_context = if message.trim().is_empty() {
            String::new()
        } else {
            match self
                .inner
                .memory
                .retrieve(message, runtime.config.memory.retrieval_top_k)
                .await
            {
                Ok(context) => context,
                Err(e) => {
                    warn!("Memory retrieval failed: {e}");
                    audit.log_error("memory retrieval failed", Some(&e));
                    String::new()
                }
            }
        };

        let planner = ReactPlanner::new(runtime.executor.clone());
        let system_prompt = runtime.prompts.build_system_prompt(
            &memory_context,
            planner.tools(),
            &runtime.config.runtime.extra_instructions,
        );
        let used_planning =
            runtime.config.planner.strategy.plans() && planner.needs_planning(message);

        debug!(
            conv_id = %conv_id,
            used_planning,
            memory_chars = memory_context.len(),
            "Turn prepared"
        );

        Turn {
            system_prompt,
            planner,
            metadata: TurnMetadata {
                used_planning,
                memory_retrieved: !memory_context.is_empty(),
                ..TurnMetadata::default()
            },
        }
    }

    /// Thought → Action → Observation until a final answer, a step with
    /// nothing to do, or a limit. Returns the raw answer text.
    async fn run_react_loop(
        &self,
        runtime: &Runtime,
        mut planner: ReactPlanner,
        message: &str,
        history: &[Message],
        system_prompt: &str,
        metadata: &mut TurnMetadata,
    ) -> String {
        let audit = &self.inner.audit;
        let max_steps = runtime.config.planner.max_steps;
        let max_tool_calls = runtime.config.runtime.max_tool_calls;

        planner.reset();
        let mut transcript = String::new();
        let mut output = String::new();
        let mut tool_calls = 0;

        for iteration in 1..=max_steps {
            let prompt = if transcript.is_empty() {
                message.to_string()
            } else {
                format!("{message}\n{transcript}\n\nNow answer the original request.")
            };

            output = match generate_within(
                self.inner.model.as_ref(),
                &prompt,
                history,
                system_prompt,
                runtime.config.model_timeout(),
            )
            .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(iteration, "Model call failed during planning: {e}");
                    audit.log_error("model call failed during planning", Some(&e));
                    metadata.error = Some(e.to_string());
                    return if output.trim().is_empty() {
                        GENERATION_ERROR_ANSWER.to_string()
                    } else {
                        output.trim().to_string()
                    };
                }
            };

            let mut step = planner.parse_model_output(&output);
            debug!(
                iteration,
                is_final = step.is_final,
                action = step.action.as_deref().unwrap_or(""),
                "Parsed model output"
            );

            if step.is_final {
                audit.log_plan_step(&step);
                let answer = step.final_answer.clone();
                metadata.steps.push(step);
                return answer;
            }

            let Some(tool_id) = step.action.clone() else {
                audit.log_plan_step(&step);
                metadata.steps.push(step);
                return output.trim().to_string();
            };

            tool_calls += 1;
            if tool_calls > max_tool_calls {
                warn!(limit = max_tool_calls, "Tool call limit reached");
                audit.log_plan_step(&step);
                audit.log_event(
                    "max_tool_calls_exceeded",
                    json!({"limit": max_tool_calls}),
                    AuditLevel::Warn,
                );
                metadata.steps.push(step);
                return output.trim().to_string();
            }

            let observation = planner.execute_step(&mut step).await;
            if let Some(result) = &observation.result {
                audit.log_tool_call(&step.action_params, result);
            }
            audit.log_plan_step(&step);

            transcript.push('\n');
            transcript.push_str(&planner.build_continuation_prompt(&step));
            transcript = trim_context(&transcript, MAX_CONTEXT_CHARS);

            metadata.tools_called.push(tool_id);
            metadata.steps.push(step);
        }

        warn!(max_steps, "ReAct loop hit the step limit without a final answer");
        audit.log_event(
            "react_max_steps",
            json!({"steps": metadata.steps.len(), "max": max_steps}),
            AuditLevel::Warn,
        );
        output.trim().to_string()
    }

    fn generation_failed(&self, error: &ModelError, metadata: &mut TurnMetadata) -> String {
        warn!("Model generation failed: {error}");
        self.inner.audit.log_error("model generation failed", Some(error));
        metadata.error = Some(error.to_string());
        GENERATION_ERROR_ANSWER.to_string()
    }

    fn complete_turn(
        &self,
        runtime: &Runtime,
        message: &str,
        conv_id: &ConversationId,
        answer: &str,
        metadata: &TurnMetadata,
    ) {
        self.inner.audit.log_conversation_turn(
            conv_id,
            Role::Assistant,
            answer,
            Some(metadata.summary()),
        );
        self.spawn_extraction(runtime, message);
    }

    /// Fire-and-forget fact extraction. Finished tasks are reaped on
    /// each spawn; [`Pilot::shutdown`] aborts whatever is left.
    fn spawn_extraction(&self, runtime: &Runtime, message: &str) {
        if message.trim().chars().count() < MIN_EXTRACTION_CHARS {
            return;
        }
        let prompts = runtime.prompts.clone();
        let limit = runtime.config.model_timeout();
        let model = self.inner.model.clone();
        let memory = self.inner.memory.clone();
        let audit = self.inner.audit.clone();
        let message = message.to_string();

        let mut tasks = self.background();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            extract_and_store(
                model.as_ref(),
                prompts.as_ref(),
                memory.as_ref(),
                &audit,
                &message,
                limit,
            )
            .await;
        });
    }

    /// Wait for every pending background extraction.
    pub async fn flush_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background());
        while tasks.join_next().await.is_some() {}
    }

    // --- Memory ---

    pub async fn add_fact(&self, key: &str, value: &str, source: &str) -> Result<i64, MemoryError> {
        let id = self.inner.memory.add_fact(key, value, source).await?;
        self.inner
            .audit
            .log_memory_op("add_fact", json!({"id": id, "key": key.trim(), "source": source}));
        Ok(id)
    }

    pub async fn get_all_facts(&self) -> Result<Vec<Fact>, MemoryError> {
        self.inner.memory.get_all_facts().await
    }

    pub async fn add_document(
        &self,
        path: &str,
        content: &str,
        tags: &[String],
    ) -> Result<Vec<i64>, MemoryError> {
        let ids = self.inner.memory.add_document(path, content, tags).await?;
        self.inner
            .audit
            .log_memory_op("add_document", json!({"path": path, "chunks": ids.len()}));
        Ok(ids)
    }

    pub async fn add_task(
        &self,
        title: &str,
        due_at: Option<DateTime<Utc>>,
        payload: Option<Value>,
    ) -> Result<i64, MemoryError> {
        let id = self.inner.memory.add_task(title, due_at, payload).await?;
        self.inner
            .audit
            .log_memory_op("add_task", json!({"id": id, "title": title}));
        Ok(id)
    }

    pub async fn get_open_tasks(&self) -> Result<Vec<Task>, MemoryError> {
        self.inner.memory.get_open_tasks().await
    }

    pub async fn update_task_status(&self, id: i64, status: &str) -> Result<bool, MemoryError> {
        let updated = self.inner.memory.update_task_status(id, status).await?;
        self.inner.audit.log_memory_op(
            "update_task",
            json!({"id": id, "status": status, "updated": updated}),
        );
        Ok(updated)
    }

    /// The same context block a turn would see for `query`.
    pub async fn search_memory(&self, query: &str) -> Result<String, MemoryError> {
        let top_k = self.runtime().config.memory.retrieval_top_k;
        self.inner.memory.retrieve(query, top_k).await
    }

    pub async fn get_memory_stats(&self) -> Result<MemoryStats, MemoryError> {
        self.inner.memory.stats().await
    }

    // --- Lifecycle ---

    pub async fn get_status(&self) -> PilotStatus {
        let runtime = self.runtime();
        let memory = self.get_memory_stats().await.unwrap_or_else(|e| {
            warn!("Memory stats unavailable: {e}");
            MemoryStats::default()
        });
        PilotStatus {
            name: runtime.config.meta.name.clone(),
            version: runtime.config.meta.version.clone(),
            model: self.inner.model.name().to_string(),
            planner: runtime.config.planner.strategy.as_str().to_string(),
            tools: runtime
                .executor
                .available_tools()
                .into_iter()
                .map(|t| t.id)
                .collect(),
            memory,
            audit: self.inner.audit.stats(),
        }
    }

    /// Re-read the configuration file this pilot was built from.
    pub fn reload_config(&self) -> Result<(), Error> {
        let current = self.config();
        let path = current.source_path().ok_or_else(|| Error::Config {
            message: "configuration was not loaded from a file".into(),
        })?;
        let config = PilotConfig::load_from(path).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        self.apply_config(config)
    }

    /// Swap in a new configuration. Memory store and audit trail are
    /// kept; tools, routing, planner and prompt settings take effect on
    /// the next turn.
    pub fn apply_config(&self, config: PilotConfig) -> Result<(), Error> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let version = config.meta.version.clone();
        let runtime = Runtime::new(
            Arc::new(config),
            self.inner.memory.clone(),
            self.inner.custom_prompts.clone(),
        )?;

        *self
            .inner
            .runtime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(runtime);

        self.inner
            .audit
            .log_event("config_reload", json!({"version": version}), AuditLevel::Info);
        info!(version = %version, "Configuration reloaded");
        Ok(())
    }

    /// Abort background work, flush the audit trail, close the store.
    pub async fn shutdown(&self) {
        self.inner
            .audit
            .log_event("pilot_shutdown", json!({}), AuditLevel::Info);

        let mut tasks = std::mem::take(&mut *self.background());
        tasks.shutdown().await;

        let audit = Arc::clone(&self.inner.audit);
        match tokio::task::spawn_blocking(move || audit.close()).await {
            Ok(Err(e)) => warn!("Audit flush on shutdown failed: {e}"),
            Err(e) => warn!("Audit flush task failed: {e}"),
            Ok(Ok(())) => {}
        }
        if let Err(e) = self.inner.memory.close().await {
            warn!("Closing memory store failed: {e}");
        }
        info!("Pilot shut down");
    }
}

fn finish_answer(runtime: &Runtime, raw: &str) -> String {
    let answer = post_process(raw, runtime.config.policies.redact_secrets);
    if answer.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        answer
    }
}
