//! Shared utility functions.

/// Shorten `s` to at most `max_bytes` for log output, never splitting a UTF-8
/// character. Truncated text is suffixed with the omitted byte count.
pub fn preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (+{} bytes)", &s[..end], s.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_unchanged() {
        assert_eq!(preview("{}", 10), "{}");
    }

    #[test]
    fn long_strings_report_omitted_bytes() {
        assert_eq!(preview("abcdefghij", 4), "abcd... (+6 bytes)");
    }

    #[test]
    fn respects_char_boundaries() {
        // 'é' is two bytes; cutting at 1 must back off to 0
        assert_eq!(preview("été", 1), "... (+5 bytes)");
    }
}
