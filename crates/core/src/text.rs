//! Small character-safe string helpers shared across crates.

/// Truncate to at most `max_chars` characters, never splitting a UTF-8
/// sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Like [`truncate_chars`] but appends a marker when something was cut.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{cut}{marker}")
    } else {
        cut.to_string()
    }
}
