//! A full turn through real SQLite memory, the real sandbox and an
//! on-disk audit trail. Only the language model is scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pilot_agent::Pilot;
use pilot_agent::extraction::EXTRACTION_SYSTEM_PROMPT;
use pilot_config::PilotConfig;
use pilot_core::error::ModelError;
use pilot_core::memory::MemoryStore;
use pilot_core::message::{ConversationId, Message};
use pilot_core::model::LanguageModel;
use pilot_memory::SqliteMemory;

struct ReplayModel {
    replies: Mutex<VecDeque<&'static str>>,
    prompts: Mutex<Vec<String>>,
}

impl ReplayModel {
    fn new(replies: &[&'static str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for ReplayModel {
    fn name(&self) -> &str {
        "replay"
    }

    async fn generate(
        &self,
        prompt: &str,
        _history: &[Message],
        system_prompt: &str,
    ) -> Result<String, ModelError> {
        if system_prompt == EXTRACTION_SYSTEM_PROMPT {
            return Ok(r#"```json
{"facts": [{"key": "project", "value": "Apollo"}]}
```"#
                .to_string());
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .map(String::from)
            .ok_or_else(|| ModelError::Unavailable("no more replies".into()))
    }
}

#[tokio::test]
async fn planned_turn_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PilotConfig::default();
    config.sandbox.fs_root = dir.path().join("workspace");
    config.memory.db_path = dir.path().join("data/memory.sqlite");
    config.audit.events_path = dir.path().join("data/logs/events.jsonl");
    config.audit.conversations_path = dir.path().join("data/logs/conversations.jsonl");

    let model = Arc::new(ReplayModel::new(&[
        "Pensiero: cerco la data in memoria\nAzione: db({\"action\": \"search\", \"query\": \"launch\"})",
        "Thought: now the plan file\nAction: fs({'action': 'read', 'path': 'plan.txt'})",
        "Risposta Finale: Apollo launches on 12 May; the plan says: test engines first.\nThought: leftover",
    ]));
    let pilot = Pilot::builder(config.clone(), model.clone())
        .build()
        .await
        .unwrap();

    std::fs::write(dir.path().join("workspace/plan.txt"), "test engines first").unwrap();
    pilot
        .add_document("notes/launch.md", "The Apollo launch is set for 12 May.", &["project".into()])
        .await
        .unwrap();

    let response = pilot
        .process(
            "I work on project Apollo: search memory for the launch date and read file plan.txt",
            &[Message::user("hi"), Message::assistant("Hello!")],
            &ConversationId::from("e2e"),
        )
        .await;

    assert_eq!(
        response.answer,
        "Apollo launches on 12 May; the plan says: test engines first."
    );
    assert!(response.metadata.used_planning);
    assert!(response.metadata.memory_retrieved);
    assert_eq!(response.metadata.tools_called, ["db", "fs"]);
    assert!(response.metadata.steps[0].observation.contains("12 May"));
    assert_eq!(response.metadata.steps[1].observation, "test engines first");

    let prompts = model.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("Observation: test engines first"));

    pilot.flush_background().await;
    pilot.shutdown().await;

    let events = std::fs::read_to_string(dir.path().join("data/logs/events.jsonl")).unwrap();
    assert!(events.contains("\"event\":\"pilot_startup\""));
    assert!(events.contains("\"type\":\"tool_call\""));
    assert!(events.contains("\"event\":\"pilot_shutdown\""));
    assert!(!events.contains("leftover"));

    let conversations =
        std::fs::read_to_string(dir.path().join("data/logs/conversations.jsonl")).unwrap();
    assert_eq!(conversations.lines().count(), 2);
    // Prompt logging is off by default: lengths only.
    assert!(!conversations.contains("search memory for the launch date"));

    let reopened = SqliteMemory::open(&config.memory.db_path).await.unwrap();
    let learned = reopened.get_fact("project").await.unwrap().unwrap();
    assert_eq!(learned.value, "Apollo");
    assert_eq!(reopened.search_documents("launch", 5).await.unwrap().len(), 1);
}
