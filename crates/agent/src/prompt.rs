//! The default system prompt: identity, safety, tools, memory, output.

use pilot_config::PilotConfig;
use pilot_core::prompt::PromptBuilder;
use pilot_core::tool::ToolDescriptor;

/// Sectioned system prompt built from the `[meta]` and `[policies]`
/// configuration.
#[derive(Debug, Clone)]
pub struct DefaultPromptBuilder {
    name: String,
    version: String,
    description: String,
    redact_secrets: bool,
}

impl Default for DefaultPromptBuilder {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

impl DefaultPromptBuilder {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            name: config.meta.name.clone(),
            version: config.meta.version.clone(),
            description: config.meta.description.clone(),
            redact_secrets: config.policies.redact_secrets,
        }
    }

    fn identity(&self) -> String {
        let mut lines = vec![
            "[IDENTITY]".to_string(),
            format!("Name: {}", self.name),
            format!("Version: {}", self.version),
        ];
        if !self.description.is_empty() {
            lines.push(format!("Description: {}", self.description));
        }
        lines.join("\n")
    }

    fn safety(&self) -> String {
        let mut lines = vec![
            "[SAFETY]".to_string(),
            "Refuse requests that would harm people, systems or data.".to_string(),
            "Tools only see the sandbox directory; never try to reach files outside it.".to_string(),
        ];
        if self.redact_secrets {
            lines.push("Never reveal credentials, API keys, passwords or tokens in your output.".into());
        }
        lines.join("\n")
    }
}

fn tools_section(tools: &[ToolDescriptor]) -> String {
    let mut lines = vec![
        "[TOOLS]".to_string(),
        "You can use these tools. To call one, use EXACTLY this format:".to_string(),
        String::new(),
        "Thought: <reasoning about what to do>".to_string(),
        "Action: <tool_id>(<JSON parameters>)".to_string(),
        String::new(),
        "After the result (Observation) you may take another Action or give the final answer."
            .to_string(),
        "Reply with 'Final Answer: <text>' once you have enough information.".to_string(),
        String::new(),
        "Tools:".to_string(),
    ];
    for tool in tools {
        lines.push(format!("  - {} ({}): {}", tool.id, tool.name, tool.description));
    }
    lines.join("\n")
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build_system_prompt(
        &self,
        memory_context: &str,
        tools: &[ToolDescriptor],
        extra_instructions: &str,
    ) -> String {
        let mut sections = vec![self.identity(), self.safety()];

        if !tools.is_empty() {
            sections.push(tools_section(tools));
        }
        if !memory_context.trim().is_empty() {
            sections.push(format!(
                "[MEMORY CONTEXT]\nUse this information when relevant:\n{memory_context}"
            ));
        }
        if !extra_instructions.trim().is_empty() {
            sections.push(format!("[EXTRA INSTRUCTIONS]\n{}", extra_instructions.trim()));
        }
        sections.push(
            "[OUTPUT]\nAnswer in the user's language. Be accurate and concise; \
             say so when you do not know something."
                .to_string(),
        );

        sections.join("\n\n")
    }
}
