//! Rendering of retrieval results into a prompt-ready context block.

use pilot_core::memory::{DocumentChunk, Fact, Task};
use pilot_core::text::truncate_chars;

/// Document bodies are cut to this many characters in the context block.
pub const DOC_PREVIEW_CHARS: usize = 300;

/// Open tasks included in every retrieval.
pub const MAX_CONTEXT_TASKS: usize = 5;

/// Render facts, document chunks and open tasks as labeled sections
/// separated by blank lines. Empty input renders as an empty string.
pub fn format_context(facts: &[Fact], docs: &[DocumentChunk], tasks: &[Task]) -> String {
    let mut sections = Vec::new();

    if !facts.is_empty() {
        let lines: Vec<String> = facts
            .iter()
            .map(|f| format!("  • {}: {}", f.key, f.value))
            .collect();
        sections.push(format!("Known facts:\n{}", lines.join("\n")));
    }

    if !docs.is_empty() {
        let lines: Vec<String> = docs
            .iter()
            .map(|d| {
                format!(
                    "  [{} #{}] {}",
                    d.path,
                    d.chunk_idx,
                    truncate_chars(&d.content, DOC_PREVIEW_CHARS)
                )
            })
            .collect();
        sections.push(format!("Relevant documents:\n{}", lines.join("\n")));
    }

    if !tasks.is_empty() {
        let lines: Vec<String> = tasks
            .iter()
            .take(MAX_CONTEXT_TASKS)
            .map(|t| format!("  [{}] {} (status: {})", t.id, t.title, t.status))
            .collect();
        sections.push(format!("Open tasks:\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fact(key: &str, value: &str) -> Fact {
        Fact {
            id: 1,
            key: key.into(),
            value: value.into(),
            source: "user".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_renders_empty() {
        assert_eq!(format_context(&[], &[], &[]), "");
    }

    #[test]
    fn sections_are_labeled_and_separated() {
        let doc = DocumentChunk {
            id: 7,
            path: "notes.md".into(),
            chunk_idx: 2,
            content: "z".repeat(1000),
            tags: vec![],
            created_at: Utc::now(),
        };
        let out = format_context(&[fact("name", "Marco")], &[doc], &[]);
        let parts: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "Known facts:\n  • name: Marco");
        assert!(parts[1].starts_with("Relevant documents:\n  [notes.md #2] "));
        assert_eq!(parts[1].matches('z').count(), DOC_PREVIEW_CHARS);
    }

    #[test]
    fn tasks_are_capped() {
        let tasks: Vec<Task> = (0..8)
            .map(|i| Task {
                id: i,
                title: format!("task {i}"),
                status: "open".into(),
                due_at: None,
                payload: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .collect();
        let out = format_context(&[], &[], &tasks);
        assert!(out.starts_with("Open tasks:"));
        assert_eq!(out.lines().count(), 1 + MAX_CONTEXT_TASKS);
    }
}
