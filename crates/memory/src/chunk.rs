//! Overlapping, whitespace-aware document chunking.

/// Chunk size used when a caller passes zero.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// Chunking limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: 200,
        }
    }
}

/// Split `text` into chunks of at most `max_chars` characters, each
/// starting `overlap` characters before the previous one ended.
///
/// The overlap is clamped to half the chunk size so every chunk advances.
/// When a cut would land inside a word, the chunk ends at the last
/// whitespace within its final 20% instead, if there is one.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let max_chars = if max_chars == 0 { DEFAULT_MAX_CHARS } else { max_chars };
    let overlap = overlap.min(max_chars / 2);

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let min_boundary = max_chars * 4 / 5;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());

        let mid_word = end < chars.len() && !chars[end].is_whitespace() && !chars[end - 1].is_whitespace();
        if mid_word
            && let Some(offset) = chars[start + min_boundary..end]
                .iter()
                .rposition(|c| c.is_whitespace())
        {
            let candidate = start + min_boundary + offset;
            if candidate > start {
                end = candidate;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("ciao mondo", 100, 10), vec!["ciao mondo".to_string()]);
    }

    #[test]
    fn chunks_respect_max_size() {
        let text = "lorem ipsum dolor sit amet ".repeat(100);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn prefers_whitespace_boundaries() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(20);
        for chunk in chunk_text(&text, 50, 10).iter().take(5) {
            // Every chunk except possibly the last ends on a whole word.
            let last = chunk.split_whitespace().last().unwrap();
            assert!(text.contains(&format!("{last} ")), "{chunk}");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text: String = (0..300).map(|i| format!("w{i} ")).collect();
        let chunks = chunk_text(&text, 120, 30);
        for pair in chunks.windows(2) {
            let tail_word = pair[0].split_whitespace().last().unwrap();
            assert!(pair[1].contains(tail_word), "{:?}", pair);
        }
    }

    #[test]
    fn covers_every_word() {
        let text: String = (0..500).map(|i| format!("tok{i} ")).collect();
        let chunks = chunk_text(&text, 80, 15);
        for i in 0..500 {
            let word = format!("tok{i}");
            assert!(
                chunks.iter().any(|c| c.split_whitespace().any(|w| w == word)),
                "missing {word}"
            );
        }
    }

    #[test]
    fn oversized_overlap_still_progresses() {
        let text = "x".repeat(1000);
        let chunks = chunk_text(&text, 100, 500);
        // Overlap clamps to 50, so each chunk advances by 50.
        assert_eq!(chunks.len(), 19);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn zero_max_uses_default() {
        let text = "y".repeat(DEFAULT_MAX_CHARS + 1);
        assert_eq!(chunk_text(&text, 0, 0).len(), 2);
    }

    #[test]
    fn multibyte_text_is_safe() {
        let text = "perché è così ".repeat(50);
        let chunks = chunk_text(&text, 40, 8);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
    }
}
