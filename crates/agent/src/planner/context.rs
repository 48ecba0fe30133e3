//! Bounding the accumulated ReAct transcript.

/// Ceiling for the transcript fed back to the model each step.
pub const MAX_CONTEXT_CHARS: usize = 8000;

/// Where a kept head may end at the earliest.
const HEAD_MIN_CHARS: usize = 200;

pub const OMISSION_MARKER: &str = "\n\n[...intermediate steps omitted...]\n\n";

/// Keep the head (the original request, up to its first paragraph break
/// after 200 chars) and the most recent tail, dropping the middle.
///
/// The result never exceeds `max_chars` characters.
pub fn trim_context(context: &str, max_chars: usize) -> String {
    let total = context.chars().count();
    if total <= max_chars {
        return context.to_string();
    }

    let marker_chars = OMISSION_MARKER.chars().count();
    if max_chars <= marker_chars {
        return context.chars().skip(total - max_chars).collect();
    }

    let head_end = paragraph_break_after(context, HEAD_MIN_CHARS)
        .filter(|&end| end <= max_chars / 3)
        .unwrap_or(max_chars / 4);
    let tail_chars = max_chars - marker_chars - head_end.min(max_chars - marker_chars);

    let head: String = context.chars().take(head_end).collect();
    let tail: String = context.chars().skip(total - tail_chars).collect();
    format!("{head}{OMISSION_MARKER}{tail}")
}

/// Char offset of the first `\n\n` at or after char `min`.
fn paragraph_break_after(text: &str, min: usize) -> Option<usize> {
    let (start, _) = text.char_indices().nth(min)?;
    let found = text[start..].find("\n\n")? + start;
    Some(text[..found].chars().count())
}
