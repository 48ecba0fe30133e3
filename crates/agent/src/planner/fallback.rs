//! Best-effort recovery of a tool call from natural-language output.
//!
//! Small models often describe the action instead of writing
//! `Action: id(...)`. Each matcher below recognises one tool kind from
//! a handful of bilingual phrasings and guesses parameters from quoted
//! substrings. This is a heuristic: it is expected to miss some
//! phrasings and to occasionally fire on prose that merely mentions a
//! file.

use std::sync::LazyLock;

use pilot_core::tool::{ToolDescriptor, ToolKind};
use regex_lite::Regex;
use serde_json::{Map, Value, json};

/// A matcher: does the text ask for this kind, and with what parameters.
pub type Matcher = fn(&str) -> Option<Map<String, Value>>;

/// Matchers in priority order.
pub const CHAIN: &[(ToolKind, Matcher)] = &[
    (ToolKind::Filesystem, match_filesystem),
    (ToolKind::Code, match_code),
    (ToolKind::Memory, match_memory),
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static FILESYSTEM: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"legg[io].*file",
        r"apri.*file",
        r"list[ao].*director",
        r"list[ao].*cartell",
        r"read.*file",
        r"open.*file",
        r"list.*director",
    ])
});

static CODE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"esegu[io].*codice",
        r"esegu[io].*python",
        r"calcol[ao]",
        r"run.*code",
        r"execute.*python",
        r"calculat",
    ])
});

static MEMORY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"cerc[ao].*memori",
        r"ricord[ao]",
        r"fatt[io].*not[io]",
        r"search.*memor",
        r"remember",
        r"find.*fact",
    ])
});

static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).ok());

fn mentions(patterns: &[Regex], text: &str) -> bool {
    let lowered = text.to_lowercase();
    patterns.iter().any(|re| re.is_match(&lowered))
}

fn first_quoted(text: &str) -> Option<String> {
    QUOTED
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// File reading or listing. A quoted name is read; otherwise the root
/// is listed.
pub fn match_filesystem(text: &str) -> Option<Map<String, Value>> {
    if !mentions(&FILESYSTEM, text) {
        return None;
    }
    Some(match first_quoted(text) {
        Some(path) => params(json!({"action": "read", "path": path})),
        None => params(json!({"action": "list", "path": "."})),
    })
}

/// Code execution. Only a quoted snippet is usable as code.
pub fn match_code(text: &str) -> Option<Map<String, Value>> {
    if !mentions(&CODE, text) {
        return None;
    }
    Some(match first_quoted(text) {
        Some(code) => params(json!({"code": code})),
        None => Map::new(),
    })
}

/// Memory search. Without a quoted query, the first few content words
/// of the text are used.
pub fn match_memory(text: &str) -> Option<Map<String, Value>> {
    if !mentions(&MEMORY, text) {
        return None;
    }
    let query = first_quoted(text).unwrap_or_else(|| {
        let words: Vec<&str> = text
            .split_whitespace()
            .filter(|w| w.chars().count() > 3)
            .take(5)
            .collect();
        if words.is_empty() {
            "search".to_string()
        } else {
            words.join(" ")
        }
    });
    Some(params(json!({"action": "search", "query": query})))
}

fn default_id(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::Filesystem => "fs",
        ToolKind::Code => "py",
        ToolKind::Shell => "sh",
        ToolKind::Memory => "db",
    }
}

/// Run the chain and resolve the matched kind to a tool id.
///
/// With an available tool list, only kinds present in it can match and
/// the first tool of that kind is used. An empty list falls back to the
/// default registry ids.
pub fn fallback_action(text: &str, tools: &[ToolDescriptor]) -> Option<(String, Map<String, Value>)> {
    for (kind, matcher) in CHAIN {
        let tool_id = if tools.is_empty() {
            Some(default_id(*kind).to_string())
        } else {
            tools.iter().find(|t| t.kind == *kind).map(|t| t.id.clone())
        };
        let Some(tool_id) = tool_id else {
            continue;
        };
        if let Some(params) = matcher(text) {
            return Some((tool_id, params));
        }
    }
    None
}
