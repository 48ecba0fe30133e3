//! `pilot logs` — Tail the audit trail.

use std::path::Path;

use serde_json::Value;

use super::CmdResult;

pub fn run(config_path: &Path, conversations: bool, lines: usize) -> CmdResult {
    let config = super::load_config(config_path)?;
    let audit = super::open_audit(&config);
    if !audit.is_enabled() {
        println!("Audit trail is disabled.");
        return Ok(());
    }

    let records = if conversations {
        audit.read_recent_conversations(lines)?
    } else {
        audit.read_recent_events(lines)?
    };
    if records.is_empty() {
        println!("No audit records yet.");
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

/// One line per record: timestamp, level, kind, then the rest as JSON.
fn format_record(record: &Value) -> String {
    let Value::Object(map) = record else {
        return record.to_string();
    };
    let field = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or("-");

    let kind = match (field("type"), map.get("event").and_then(Value::as_str)) {
        ("event", Some(event)) => event.to_string(),
        ("conversation_turn", _) => format!("{} {}", field("conv_id"), field("role")),
        (other, _) => other.to_string(),
    };

    let mut rest = map.clone();
    for key in ["ts", "level", "type", "event", "conv_id", "role"] {
        rest.remove(key);
    }
    format!(
        "{} {:<5} {kind} {}",
        field("ts"),
        field("level").to_uppercase(),
        Value::Object(rest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_records_show_event_name() {
        let line = format_record(&json!({
            "ts": "2026-01-01T00:00:00Z",
            "level": "warn",
            "type": "event",
            "event": "max_tool_calls_exceeded",
            "data": {"limit": 5}
        }));
        assert_eq!(
            line,
            r#"2026-01-01T00:00:00Z WARN  max_tool_calls_exceeded {"data":{"limit":5}}"#
        );
    }

    #[test]
    fn conversation_records_show_conversation_and_role() {
        let line = format_record(&json!({
            "ts": "t", "level": "info", "type": "conversation_turn",
            "conv_id": "c1", "role": "user", "content_length": 4
        }));
        assert_eq!(line, r#"t INFO  c1 user {"content_length":4}"#);
    }
}
