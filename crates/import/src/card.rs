//! Card-purchase detection on description text.

use regex::Regex;
use std::sync::OnceLock;

macro_rules! re {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($re).expect("valid regex"))
        }
    };
}

// Two or more 4-digit groups, as printed on masked card numbers.
re!(card_digits_re, r"(?:\d{4}(?:[ -]?|$)){2,}");

/// Heuristic check for card-purchase descriptions: an explicit "kort" token,
/// masked card digit groups, or the comma-separated merchant,city,CC shape
/// that card processors emit.
pub fn is_card_purchase(description: &str) -> bool {
    let trimmed = description.trim();
    if trimmed.len() < 3 {
        return false;
    }
    if trimmed.to_lowercase().contains("kort") {
        return true;
    }
    if card_digits_re().is_match(trimmed) {
        return true;
    }
    trimmed.contains(',') && trimmed.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kort_token_matches() {
        assert!(is_card_purchase("Kortköp ICA KVANTUM"));
        assert!(is_card_purchase("KORTKÖP 240102"));
    }

    #[test]
    fn masked_digit_groups_match() {
        assert!(is_card_purchase("VISA 1234 5678"));
        assert!(is_card_purchase("PAYMENT 1234-5678-9012"));
        assert!(!is_card_purchase("Faktura 1234"));
    }

    #[test]
    fn processor_comma_shape_matches() {
        assert!(is_card_purchase("HOBBEX.SE,STOCKHOLM,SE 24-01-02"));
        assert!(!is_card_purchase("Anna, tack för middagen"));
    }

    #[test]
    fn short_descriptions_never_match() {
        assert!(!is_card_purchase("ab"));
        assert!(!is_card_purchase(""));
    }
}
