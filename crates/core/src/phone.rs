//! Phone number normalization for duplicate matching.
//!
//! CRM phone fields are free text: operators paste numbers with
//! spaces, parentheses and hyphens in whatever shape the caller id
//! showed them. Matching strips exactly those separators and nothing
//! else, so `+7 (912) 555-01-02` and `+79125550102` compare equal
//! while genuinely different numbers stay distinct.

/// Strips whitespace and the characters `(`, `)`, `-` from a phone
/// string, keeping every other character in its original order.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|ch| !ch.is_whitespace() && !matches!(ch, '(' | ')' | '-')).collect()
}

#[cfg(test)]
mod tests {
    use super::normalize_phone;

    #[test]
    fn strips_spaces_parentheses_and_hyphens() {
        assert_eq!(normalize_phone("+7 (912) 555-01-02"), "+79125550102");
        assert_eq!(normalize_phone("(555) 010-0199"), "5550100199");
    }

    #[test]
    fn strips_all_whitespace_kinds() {
        assert_eq!(normalize_phone(" 555\t01\u{a0}00 "), "5550100");
    }

    #[test]
    fn keeps_non_separator_characters_in_order() {
        assert_eq!(normalize_phone("+1.555.0100 ext 42"), "+1.555.0100ext42");
    }

    #[test]
    fn already_normalized_input_is_unchanged() {
        assert_eq!(normalize_phone("+79125550102"), "+79125550102");
    }

    #[test]
    fn empty_and_separator_only_input_normalizes_to_empty() {
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone(" () - "), "");
    }
}
