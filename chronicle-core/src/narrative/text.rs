//! Small string helpers shared by the narrative analyzers.

/// Check if `text` contains `word` at word boundaries.
///
/// A word boundary is the start/end of string or a non-alphanumeric byte, so
/// multi-word names match as a phrase ("old tom" in "ask old tom about it").
pub fn contains_word(text: &str, word: &str) -> bool {
    !word_positions(text, word).is_empty()
}

/// Byte offsets of every word-boundary occurrence of `word` in `text`.
pub fn word_positions(text: &str, word: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    if word.is_empty() {
        return positions;
    }

    let text_bytes = text.as_bytes();
    let word_bytes = word.as_bytes();
    let text_len = text_bytes.len();
    let word_len = word_bytes.len();

    if word_len > text_len {
        return positions;
    }

    let mut i = 0;
    while i + word_len <= text_len {
        if &text_bytes[i..i + word_len] == word_bytes {
            let left_ok = i == 0 || !text_bytes[i - 1].is_ascii_alphanumeric();
            let right_ok =
                i + word_len == text_len || !text_bytes[i + word_len].is_ascii_alphanumeric();

            if left_ok && right_ok {
                positions.push(i);
                i += word_len;
                continue;
            }
        }
        i += 1;
    }

    positions
}

/// Slice `text` between two byte offsets, widened to char boundaries and trimmed.
pub fn excerpt(text: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = end.clamp(start, text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].trim()
}

/// Keep at most `max` characters, ending with `...` when something was cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// Keep at most `max` characters without any marker.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Collapse runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundaries() {
        assert!(contains_word("i ask thor about the hammer", "thor"));
        assert!(!contains_word("i ask thorin about the ring", "thor"));
        assert!(contains_word("through king alaric's gate", "king alaric"));
        assert_eq!(word_positions("lyra, lyra and lyrae", "lyra"), vec![0, 6]);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "Élan fell — and then the rest";
        let slice = excerpt(text, 1, 12);
        assert!(slice.starts_with("Élan"));
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
