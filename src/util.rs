//! Shared utility functions used across the codebase.

/// Find the largest valid UTF-8 char boundary at or before `pos`.
///
/// Polyfill for `str::floor_char_boundary` (nightly-only). Use when
/// truncating strings by byte position to avoid panicking on multi-byte
/// characters.
pub fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Truncate `s` to at most `max_bytes` bytes on a char boundary, per the
/// content-preview rule used by `get_all_memories` and the duplicate
/// detector's first-100-chars comparison window.
pub fn truncate_preview(s: &str, max_bytes: usize) -> &str {
    let cut = floor_char_boundary(s, max_bytes);
    &s[..cut]
}

/// Lowercase a string and split it into word tokens on non-word boundaries,
/// matching the keyword extraction rule's tokenization step (§4.3).
pub fn tokenize_words(s: &str) -> Vec<String> {
    let lower = s.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}
