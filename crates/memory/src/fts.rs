//! FTS5 query sanitization.
//!
//! User text must never reach `MATCH` as query syntax: `AND`, `NEAR`,
//! `*`, `-`, `:` and unbalanced quotes are all operators to FTS5. Each
//! token is emitted as a quoted string (inner quotes doubled), and the
//! tokens are OR-combined so BM25 can rank partial matches.

/// Build a safe FTS5 query from free text. Returns an empty string when
/// nothing searchable remains.
pub fn sanitize_fts_query(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` substring pattern.
pub fn like_pattern(text: &str) -> String {
    let escaped = text
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_every_token() {
        assert_eq!(sanitize_fts_query("come mi chiamo"), "\"come\" OR \"mi\" OR \"chiamo\"");
    }

    #[test]
    fn operators_become_literals() {
        assert_eq!(sanitize_fts_query("NOT this*"), "\"NOT\" OR \"this*\"");
        assert_eq!(sanitize_fts_query("say \"hi"), "\"say\" OR \"\"\"hi\"");
    }

    #[test]
    fn punctuation_only_tokens_dropped() {
        assert_eq!(sanitize_fts_query("? - ..."), "");
        assert_eq!(sanitize_fts_query(""), "");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
