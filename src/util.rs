//! Shared helpers

/// Shorten `s` to at most `max_len` bytes for log and error messages,
/// ending in "..." when anything was cut. Never splits a character.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    const ELLIPSIS: &str = "...";

    if s.len() <= max_len {
        return s.to_string();
    }

    let budget = max_len.saturating_sub(ELLIPSIS.len());
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= budget)
        .last()
        .unwrap_or(0);

    format!("{}{}", &s[..end], ELLIPSIS)
}
