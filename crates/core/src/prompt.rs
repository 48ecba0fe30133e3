//! System prompt assembly seam.

use crate::tool::ToolDescriptor;

/// Builds the prompts the orchestrator sends alongside user input.
///
/// Persona and style live entirely in the implementation; the
/// orchestrator only supplies the per-turn ingredients.
pub trait PromptBuilder: Send + Sync {
    /// Assemble the system prompt for one turn.
    fn build_system_prompt(
        &self,
        memory_context: &str,
        tools: &[ToolDescriptor],
        extra_instructions: &str,
    ) -> String;

    /// Prompt asking the model to pull durable facts out of a user message
    /// as `{"facts": [{"key": ..., "value": ...}]}`.
    fn build_extraction_prompt(&self, message: &str) -> String {
        format!(
            "Extract durable personal facts about the user from the message below \
             (name, preferences, projects, locations). Reply ONLY with JSON of the form \
             {{\"facts\": [{{\"key\": \"...\", \"value\": \"...\"}}]}}. Use short \
             lowercase English keys such as \"name\" or \"city\". If there are no \
             facts, reply {{\"facts\": []}}.\n\nMessage:\n{message}"
        )
    }
}
