//! UTF-8 safe text helpers used for session titles and event details.
//!
//! Titles are limited in characters rather than bytes, since they are shown
//! to people; byte truncation is still exposed for log fields.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate to at most `max_chars` characters, appending `suffix` when cut.
///
/// The suffix counts toward the limit. If the text fits, it is returned
/// unchanged.
pub fn truncate_chars(s: &str, max_chars: usize, suffix: &str) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let body = max_chars.saturating_sub(suffix.chars().count());
    let mut out: String = s.chars().take(body).collect();
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push_str(suffix);
    out
}

/// Derive a session title from the first message's content.
///
/// Only the first non-blank line is used, whitespace runs collapse to one
/// space, and the result is capped at `max_chars` characters.
pub fn derive_title(content: &str, max_chars: usize) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars, "…")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── truncate_str ─────────────────────────────────────────────────────

    #[test]
    fn bytes_within_limit() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn bytes_snap_back_to_char_boundary() {
        // 'é' is 2 bytes at 1..3
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("héllo", 3), "hé");
        assert_eq!(truncate_str("hi🦀", 5), "hi");
    }

    // ── truncate_chars ───────────────────────────────────────────────────

    #[test]
    fn chars_fit_unchanged() {
        assert_eq!(truncate_chars("short", 10, "…"), "short");
    }

    #[test]
    fn chars_cut_with_suffix() {
        assert_eq!(truncate_chars("abcdefghij", 5, "…"), "abcd…");
    }

    #[test]
    fn chars_counts_multibyte_as_one() {
        assert_eq!(truncate_chars("ééééé", 5, "…"), "ééééé");
        assert_eq!(truncate_chars("éééééé", 5, "…"), "éééé…");
    }

    #[test]
    fn chars_trims_trailing_space_before_suffix() {
        assert_eq!(truncate_chars("abc defgh", 5, "…"), "abc…");
    }

    // ── derive_title ─────────────────────────────────────────────────────

    #[test]
    fn title_uses_first_non_blank_line() {
        assert_eq!(derive_title("\n\n  Plan a trip\nto Rome", 50), "Plan a trip");
    }

    #[test]
    fn title_collapses_whitespace() {
        assert_eq!(derive_title("a   b\tc", 50), "a b c");
    }

    #[test]
    fn title_is_capped() {
        let t = derive_title(&"x".repeat(80), 50);
        assert_eq!(t.chars().count(), 50);
        assert!(t.ends_with('…'));
    }

    #[test]
    fn title_of_blank_content_is_empty() {
        assert_eq!(derive_title("   \n ", 50), "");
    }
}
