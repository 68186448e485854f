pub mod audit;
pub mod memberships;
pub mod projects;
pub mod refresh_tokens;
pub mod task_comments;
pub mod task_labels;
pub mod task_statuses;
pub mod tasks;
pub mod users;

/// Escape `%`, `_` and `\` so user text matches literally inside `ILIKE`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bug"), "%bug%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
