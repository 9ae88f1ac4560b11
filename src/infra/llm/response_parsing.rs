const MAX_ERROR_MESSAGE_LEN: usize = 256;

pub(crate) fn truncate_message(body: &str) -> String {
    let compact = body.trim().replace('\n', " ");
    compact.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

pub(crate) fn non_empty_owned(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{non_empty_owned, truncate_message};

    #[test]
    fn truncate_message_compacts_newlines_and_limits_length() {
        let input = "line-1\nline-2";
        let truncated = truncate_message(input);

        assert_eq!(truncated, "line-1 line-2");

        let long = "x".repeat(512);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.len(), 256);
    }

    #[test]
    fn non_empty_owned_trims_and_filters_blank_values() {
        assert_eq!(non_empty_owned("  stop  "), Some("stop".to_string()));
        assert_eq!(non_empty_owned("   "), None);
        assert_eq!(non_empty_owned(""), None);
    }
}
