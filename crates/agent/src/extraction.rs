//! Background learning: pull durable facts out of a user message.
//!
//! Runs after the answer is delivered. Nothing here can fail the turn:
//! model errors, malformed JSON and storage errors are logged and
//! dropped.

use std::time::Duration;

use pilot_core::memory::MemoryStore;
use pilot_core::model::LanguageModel;
use pilot_core::prompt::PromptBuilder;
use pilot_security::{AuditLevel, AuditTrail};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::model_call::generate_within;

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an information extractor. Reply ONLY with valid JSON.";

/// Messages shorter than this carry no facts worth a model call.
pub const MIN_EXTRACTION_CHARS: usize = 10;

pub const MAX_FACTS_PER_TURN: usize = 3;

pub const AUTO_EXTRACTION_SOURCE: &str = "auto_extraction";

#[derive(Debug, Deserialize)]
struct Extraction {
    #[serde(default)]
    facts: Vec<ExtractedFact>,
}

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    #[serde(default)]
    key: Value,
    #[serde(default)]
    value: Value,
}

fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Parse `{"facts": [{"key": .., "value": ..}]}`, tolerating code
/// fences and chatter around the object. Entries with an empty key or
/// value are skipped.
pub fn parse_extracted_facts(raw: &str) -> Vec<(String, String)> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    let Ok(extraction) = serde_json::from_str::<Extraction>(&raw[start..=end]) else {
        return Vec::new();
    };
    extraction
        .facts
        .iter()
        .filter_map(|fact| Some((scalar(&fact.key)?, scalar(&fact.value)?)))
        .collect()
}

/// Ask the model for facts in `message` and store up to
/// [`MAX_FACTS_PER_TURN`] of them. Returns how many were stored.
pub async fn extract_and_store(
    model: &dyn LanguageModel,
    prompts: &dyn PromptBuilder,
    memory: &dyn MemoryStore,
    audit: &AuditTrail,
    message: &str,
    limit: Duration,
) -> usize {
    if message.trim().chars().count() < MIN_EXTRACTION_CHARS {
        return 0;
    }

    let prompt = prompts.build_extraction_prompt(message);
    let raw = match generate_within(model, &prompt, &[], EXTRACTION_SYSTEM_PROMPT, limit).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Fact extraction call failed: {e}");
            audit.log_error("fact extraction failed", Some(&e));
            return 0;
        }
    };

    let facts = parse_extracted_facts(&raw);
    if facts.is_empty() {
        debug!("No facts extracted");
        return 0;
    }
    if facts.len() > MAX_FACTS_PER_TURN {
        audit.log_event(
            "auto_fact_limit_reached",
            json!({"limit": MAX_FACTS_PER_TURN, "found": facts.len()}),
            AuditLevel::Debug,
        );
    }

    let mut stored = 0;
    for (key, value) in facts.into_iter().take(MAX_FACTS_PER_TURN) {
        match memory.add_fact(&key, &value, AUTO_EXTRACTION_SOURCE).await {
            Ok(id) => {
                stored += 1;
                audit.log_memory_op(
                    "add_fact",
                    json!({"id": id, "key": key, "source": AUTO_EXTRACTION_SOURCE}),
                );
            }
            Err(e) => {
                warn!(key = %key, "Storing extracted fact failed: {e}");
                audit.log_error("storing extracted fact failed", Some(&e));
            }
        }
    }
    debug!(stored, "Fact extraction finished");
    stored
}
