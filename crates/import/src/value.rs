//! Cell-level value parsing: dates, amounts, and quote stripping.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Trim a cell and strip matched wrapping quotes, repeatedly. Some exports
/// double-quote already-quoted fields.
pub fn clean_cell(cell: &str) -> String {
    let mut s = cell.trim();
    loop {
        let bytes = s.as_bytes();
        if bytes.len() >= 2
            && (bytes[0] == b'"' || bytes[0] == b'\'')
            && bytes[bytes.len() - 1] == bytes[0]
        {
            s = s[1..s.len() - 1].trim();
        } else {
            break;
        }
    }
    s.to_string()
}

/// Try each configured chrono format in order.
pub fn parse_date(cell: &str, formats: &[String]) -> Option<NaiveDate> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(trimmed, f).ok())
}

/// Parse a Swedish-style amount: whitespace (including NBSP) as thousands
/// grouping, comma or dot as the decimal mark.
pub fn parse_amount(cell: &str) -> Option<Decimal> {
    let cleaned: String = cell
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        crate::config::ImportConfig::default().date_formats
    }

    #[test]
    fn clean_cell_strips_nested_quotes() {
        assert_eq!(clean_cell("  plain  "), "plain");
        assert_eq!(clean_cell("\"quoted\""), "quoted");
        assert_eq!(clean_cell("\"'double wrapped'\""), "double wrapped");
        assert_eq!(clean_cell("\"unmatched"), "\"unmatched");
    }

    #[test]
    fn dates_parse_in_format_order() {
        let formats = formats();
        assert_eq!(
            parse_date("2024-01-02", &formats),
            Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(
            parse_date("02/01/2024", &formats),
            Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(parse_date("not a date", &formats), None);
        assert_eq!(parse_date("", &formats), None);
    }

    #[test]
    fn amounts_round_trip_swedish_formatting() {
        assert_eq!(parse_amount("1 234,56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_amount("-967,20"), Some(Decimal::new(-96720, 2)));
        assert_eq!(parse_amount("0"), Some(Decimal::ZERO));
        assert_eq!(parse_amount("12.50"), Some(Decimal::new(1250, 2)));
        // Non-breaking space grouping.
        assert_eq!(parse_amount("1\u{a0}000,00"), Some(Decimal::new(100000, 2)));
    }

    #[test]
    fn garbage_amounts_are_rejected() {
        assert_eq!(parse_amount("ICA KVANTUM"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("  "), None);
    }
}
