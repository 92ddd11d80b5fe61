//! Text normalization for Swedish bank exports.
//!
//! Three flavors with different strictness:
//! - [`normalize_text`] — description identity (signature lookup key)
//! - [`normalize_header`] — header-alias lookup key (alphanumerics only)
//! - [`normalize_matching`] — loose form for keyword containment checks

/// Normalize a transaction description into its signature identity form:
/// lowercase, Swedish diacritics folded, punctuation turned into spaces,
/// `&` expanded to "och", apostrophes dropped, whitespace collapsed.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut pending_space = false;

    for ch in input.trim().chars() {
        let mapped: Option<char> = match ch {
            'å' | 'ä' | 'Å' | 'Ä' => Some('a'),
            'ö' | 'Ö' => Some('o'),
            '\'' | '’' => None,
            '&' => {
                flush_space(&mut out, &mut pending_space);
                out.push_str("och");
                continue;
            }
            ',' | '.' | ':' | ';' | '(' | ')' | '*' | '_' | '"' | '-' => {
                if !out.is_empty() {
                    pending_space = true;
                }
                continue;
            }
            c if c.is_whitespace() => {
                if !out.is_empty() {
                    pending_space = true;
                }
                continue;
            }
            c => Some(c.to_lowercase().next().unwrap_or(c)),
        };

        if let Some(c) = mapped {
            flush_space(&mut out, &mut pending_space);
            out.push(c);
        }
    }

    out
}

fn flush_space(out: &mut String, pending: &mut bool) {
    if *pending && !out.is_empty() {
        out.push(' ');
    }
    *pending = false;
}

/// Normalize a header cell for alias lookup: lowercase, diacritics folded,
/// everything that is not a letter or digit removed.
pub fn normalize_header(input: &str) -> String {
    fold_diacritics(input)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Normalize text for keyword containment matching: lowercase, diacritics
/// folded (including é), non-alphanumerics become spaces, whitespace kept.
pub fn normalize_matching(input: &str) -> String {
    fold_diacritics(input)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn fold_diacritics(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'å' | 'ä' => 'a',
            'ö' => 'o',
            'é' => 'e',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_folds_swedish_letters() {
        assert_eq!(normalize_text("Insättning"), "insattning");
        assert_eq!(normalize_text("Överföring"), "overforing");
    }

    #[test]
    fn normalize_text_turns_punctuation_into_spaces() {
        assert_eq!(
            normalize_text("HOBBEX.SE,STOCKHOLM,SE"),
            "hobbex se stockholm se"
        );
    }

    #[test]
    fn normalize_text_expands_ampersand() {
        assert_eq!(normalize_text("H&M Stockholm"), "hochm stockholm");
    }

    #[test]
    fn normalize_text_drops_apostrophes_and_collapses_whitespace() {
        assert_eq!(normalize_text("  McDonald's   City  "), "mcdonalds city");
    }

    #[test]
    fn normalize_text_empty_input() {
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn normalize_header_strips_everything_but_alphanumerics() {
        assert_eq!(normalize_header("Bokföringsdatum"), "bokforingsdatum");
        assert_eq!(normalize_header("Insättning/Uttag"), "insattninguttag");
        assert_eq!(normalize_header("  Belopp  "), "belopp");
    }

    #[test]
    fn normalize_matching_keeps_whitespace() {
        assert_eq!(normalize_matching("Kortköp 2025-12-17"), "kortkop 2025 12 17");
        assert_eq!(normalize_matching("Café"), "cafe");
    }
}
