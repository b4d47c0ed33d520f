pub mod http_client;

/// Truncate `text` to at most `limit` characters, appending `suffix` when cut.
///
/// The suffix counts towards the limit.
pub fn truncate_chars(text: &str, limit: usize, suffix: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
