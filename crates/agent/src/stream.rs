//! Re-chunking a finished answer for incremental delivery.

/// Approximate chunk size, in characters.
pub const STREAM_CHUNK_CHARS: usize = 20;

/// Split `text` into roughly `target`-char chunks that end on a space
/// or newline. A cut that would land mid-word is pushed to the next
/// break within another `target` chars, or to the end of the text.
///
/// Concatenating the chunks always yields `text` unchanged.
pub fn word_chunks(text: &str, target: usize) -> Vec<String> {
    let target = target.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + target).min(chars.len());
        if end < chars.len() && !chars[end].is_whitespace() {
            let limit = (end + target).min(chars.len() - 1);
            end = chars[end..=limit]
                .iter()
                .position(|c| *c == ' ' || *c == '\n')
                .map_or(chars.len(), |offset| end + offset + 1);
        }
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}
