//! Text measurement and UTF-8–safe truncation.
//!
//! History size is measured in characters, not bytes, so thresholds mean
//! the same thing for every script.

/// Number of Unicode scalar values in `s`.
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Return the prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Truncate `s` to `max_chars` characters, appending `suffix` when cut.
///
/// The result never exceeds `max_chars` characters including the suffix.
pub fn truncate_with_suffix(s: &str, max_chars: usize, suffix: &str) -> String {
    if char_len(s) <= max_chars {
        return s.to_owned();
    }
    let budget = max_chars.saturating_sub(char_len(suffix));
    format!("{}{suffix}", truncate_chars(s, budget))
}
