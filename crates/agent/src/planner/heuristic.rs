//! Keyword heuristic deciding whether a turn needs the ReAct loop.
//!
//! Phrases that name a concrete tool-shaped request score 2, loose
//! topic words score 1 (unless already covered by a matched phrase).
//! Planning starts at [`PLANNING_THRESHOLD`].

use std::collections::HashSet;

use pilot_core::tool::ToolDescriptor;

/// Score at which a message is routed through the planner.
pub const PLANNING_THRESHOLD: u32 = 3;

const STRONG_PHRASES: &[&str] = &[
    // Italian
    "leggi il file",
    "apri il file",
    "esegui codice",
    "esegui script",
    "cerca in memoria",
    "cerca nel",
    "lista directory",
    "lista cartella",
    "ricorda che",
    "salva come",
    "analizza documento",
    "crea task",
    "scrivi file",
    "calcola",
    // English
    "read file",
    "open file",
    "execute code",
    "run script",
    "search memory",
    "list directory",
    "remember that",
    "save as",
    "analyze document",
    "create task",
    "write file",
    "calculate",
];

const WEAK_WORDS: &[&str] = &[
    "file", "memoria", "task", "documento", "codice", "script", "memory", "document", "code",
];

/// Keyword score of a message (case-insensitive substring matches).
pub fn planning_score(message: &str) -> u32 {
    let lowered = message.to_lowercase();
    let mut score = 0;
    let mut covered: HashSet<&str> = HashSet::new();

    for phrase in STRONG_PHRASES {
        if lowered.contains(phrase) {
            score += 2;
            covered.extend(phrase.split_whitespace());
        }
    }
    for word in WEAK_WORDS {
        if lowered.contains(word) && !covered.contains(word) {
            score += 1;
        }
    }
    score
}

/// Whether a message should go through the ReAct loop. Always false
/// when no tool is available.
pub fn needs_planning(message: &str, tools: &[ToolDescriptor]) -> bool {
    !tools.is_empty() && planning_score(message) >= PLANNING_THRESHOLD
}
