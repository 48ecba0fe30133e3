//! Turning free-form model output into a [`PlanStep`].
//!
//! Markers are matched case-insensitively in Italian and English:
//! `Pensiero`/`Thought`, `Azione`/`Action`, `Osservazione`/`Observation`,
//! `Risposta Finale`/`Final Answer`.

use std::sync::LazyLock;

use pilot_core::plan::PlanStep;
use pilot_core::tool::ToolDescriptor;
use regex_lite::Regex;
use serde_json::{Map, Value};

use super::fallback::fallback_action;

static FINAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:risposta finale|final answer)\s*:").ok());

static MARKER_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:pensiero|thought|azione|action|osservazione|observation|risposta finale|final answer)[ \t]*:",
    )
    .ok()
});

static THOUGHT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:pensiero|thought)\s*:").ok());

static THOUGHT_END: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:azione|action|osservazione|observation|risposta finale|final answer)[ \t]*:",
    )
    .ok()
});

static ACTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:azione|action)[ \t]*:[ \t]*([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(").ok()
});

/// Parse one model turn.
///
/// Order: a final-answer marker wins outright; otherwise thought and
/// action are read independently; with neither marker present the
/// natural-language fallback chain gets a chance; and text with no
/// action and no thought becomes the final answer as-is.
pub fn parse_model_output(text: &str, step_num: usize, tools: &[ToolDescriptor]) -> PlanStep {
    let mut step = PlanStep::new(step_num, text);

    if let Some(answer) = final_answer(text) {
        step.is_final = true;
        step.final_answer = answer;
        return step;
    }

    if let Some(thought) = thought(text) {
        step.thought = thought;
    }

    if let Some((name, raw_params)) = action(text) {
        step.action = Some(name);
        step.action_params = parse_params(raw_params);
    } else if step.thought.is_empty()
        && let Some((tool_id, params)) = fallback_action(text, tools)
    {
        step.action = Some(tool_id);
        step.action_params = params;
    }

    if step.action.is_none() && step.thought.is_empty() {
        step.is_final = true;
        step.final_answer = text.trim().to_string();
    }
    step
}

/// Text after the first final-answer marker, up to the next marker line.
fn final_answer(text: &str) -> Option<String> {
    let found = FINAL.as_ref()?.find(text)?;
    let rest = &text[found.end()..];
    let end = rest
        .find('\n')
        .and_then(|nl| MARKER_LINE.as_ref()?.find_at(rest, nl))
        .map_or(rest.len(), |m| m.start());
    Some(rest[..end].trim().to_string())
}

fn thought(text: &str) -> Option<String> {
    let found = THOUGHT.as_ref()?.find(text)?;
    let rest = &text[found.end()..];
    let end = THOUGHT_END
        .as_ref()
        .and_then(|re| re.find(rest))
        .map_or(rest.len(), |m| m.start());
    let thought = rest[..end].trim();
    (!thought.is_empty()).then(|| thought.to_string())
}

/// Tool name and the raw text between its parentheses.
///
/// The arguments run to the last `)` on the action line so nested
/// parentheses inside JSON survive; multi-line arguments fall back to
/// the last `)` in the text.
fn action(text: &str) -> Option<(String, &str)> {
    let caps = ACTION.as_ref()?.captures(text)?;
    let name = caps.get(1)?.as_str().to_string();
    let rest = &text[caps.get(0)?.end()..];

    let line_end = rest.find('\n').unwrap_or(rest.len());
    let close = rest[..line_end].rfind(')').or_else(|| rest.rfind(')'));
    let raw = match close {
        Some(idx) => &rest[..idx],
        None => &rest[..line_end],
    };
    Some((name, raw))
}

/// Parse action arguments, tolerating what small local models write.
///
/// - a JSON object is used as-is
/// - a JSON array becomes `{"args": [...]}`
/// - bracketed text with single quotes is repaired and retried
/// - a bare string becomes `{"path": ..}` when it looks like a path,
///   otherwise `{"query": ..}`
/// - an unparseable object literal is kept as `{"raw": ..}`
pub fn parse_params(raw: &str) -> Map<String, Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => return map,
        Ok(Value::Array(items)) => return single("args", Value::Array(items)),
        Ok(Value::String(s)) => return classify_bare(&s),
        _ => {}
    }

    if raw.starts_with('{') || raw.starts_with('[') {
        match serde_json::from_str::<Value>(&repair_single_quotes(raw)) {
            Ok(Value::Object(map)) => return map,
            Ok(Value::Array(items)) => return single("args", Value::Array(items)),
            _ => {}
        }
    }

    if raw.starts_with('{') {
        return single("raw", Value::String(raw.to_string()));
    }
    classify_bare(raw)
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

fn classify_bare(raw: &str) -> Map<String, Value> {
    let value = raw.trim().trim_matches('"').trim_matches('\'').to_string();
    let key = if value.contains(['/', '\\', '.']) {
        "path"
    } else {
        "query"
    };
    single(key, Value::String(value))
}

/// Turn single quotes that delimit keys or values into double quotes,
/// leaving apostrophes inside words alone.
fn repair_single_quotes(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '\'' {
            let prev = chars[..i].iter().rev().find(|c| !c.is_whitespace());
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            let opens = prev.is_some_and(|p| matches!(p, ':' | ',' | '[' | '{'));
            let closes = next.is_some_and(|n| matches!(n, '}' | ']' | ':' | ','));
            if opens || closes {
                out.push('"');
                continue;
            }
        }
        out.push(c);
    }
    out
}
