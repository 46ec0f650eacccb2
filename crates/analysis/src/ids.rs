//! Parsing of the textual expression-id list stamped on bot messages.
//!
//! The reply generator records which expressions it drew from as a bracketed
//! integer list, e.g. `"[62, 201, 386]"`. The field is free text from the
//! host database, so parsing is forgiving: non-digit tokens are silently
//! dropped and malformed input yields an empty list, never an error.

/// Parse a `selected_expressions` field into expression ids.
pub fn parse_selected_ids(raw: &str) -> Vec<i64> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|part| {
            let token = part.trim();
            if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
                token.parse().ok()
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list() {
        assert_eq!(parse_selected_ids("[62, 201, 386]"), vec![62, 201, 386]);
    }

    #[test]
    fn no_spaces() {
        assert_eq!(parse_selected_ids("[1,2,3]"), vec![1, 2, 3]);
    }

    #[test]
    fn empty_list() {
        assert!(parse_selected_ids("[]").is_empty());
        assert!(parse_selected_ids("").is_empty());
        assert!(parse_selected_ids("   ").is_empty());
    }

    #[test]
    fn non_digit_tokens_dropped() {
        assert_eq!(parse_selected_ids("[1, x, 3]"), vec![1, 3]);
        assert_eq!(parse_selected_ids("[1, -2, 3]"), vec![1, 3]);
        assert_eq!(parse_selected_ids("[1.5, 2]"), vec![2]);
    }

    #[test]
    fn malformed_never_errors() {
        assert!(parse_selected_ids("not a list at all").is_empty());
        assert!(parse_selected_ids("[[]]").is_empty());
        assert_eq!(parse_selected_ids("62, 201"), vec![62, 201]);
    }
}
