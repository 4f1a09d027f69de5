//! Utility functions for notification channels

/// Maximum length for response bodies kept in logs and results.
pub const MAX_BODY_LENGTH: usize = 1000;

/// Truncate a string to at most `max_len` bytes on a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Masks a robot token for logs: the first four characters survive.
///
/// # Examples
///
/// ```
/// use alertrelay_notify::utils::redact_token;
///
/// assert_eq!(redact_token("abcdef123456"), "abcd***");
/// assert_eq!(redact_token("abc"), "***");
/// ```
pub fn redact_token(token: &str) -> String {
    if token.chars().count() <= 6 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}***")
}
