//! Keyword extraction for the inverted index (§4.3).

use crate::util::tokenize_words;

/// Tokens shorter than this (inclusive) are dropped.
const MIN_TOKEN_LEN: usize = 4;

/// Maximum tokens indexed per memory (§9: "the spec adopts 10").
const MAX_TOKENS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "and", "or", "but", "in", "with", "to", "for",
    "of", "as", "by", "that", "this", "it", "from", "be", "are", "was", "were", "been",
];

/// Lowercase, split on non-word runs, keep tokens of length > 3, drop stop
/// words, keep the first 10 survivors (§4.3).
pub fn extract_keywords(content: &str) -> Vec<String> {
    tokenize_words(content)
        .into_iter()
        .filter(|t| t.len() > MIN_TOKEN_LEN - 1)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .take(MAX_TOKENS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_tokens_and_stop_words() {
        let tokens = extract_keywords("The cat is on a mat with Redis caches");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"cat".to_string())); // len 3, dropped
        assert!(tokens.contains(&"redis".to_string()));
        assert!(tokens.contains(&"caches".to_string()));
    }

    #[test]
    fn caps_at_ten_tokens() {
        let content = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima";
        let tokens = extract_keywords(content);
        assert_eq!(tokens.len(), 10);
    }

    #[test]
    fn lowercases_tokens() {
        let tokens = extract_keywords("TypeScript Memories");
        assert_eq!(tokens, vec!["typescript".to_string(), "memories".to_string()]);
    }
}
