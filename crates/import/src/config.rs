//! Bank-profile configuration.
//!
//! A base profile plus zero or more per-bank overrides merge into one
//! [`ImportConfig`]. Later sources may only *add* mappings; a conflicting
//! remap is logged and the first mapping wins. Hard-coded fallbacks apply
//! when merging leaves no separators or date formats at all.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use kassabok_core::{normalize_header, normalize_matching, TransactionKind};

/// Semantic roles a physical column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
pub enum HeaderField {
    BookingDate,
    TransactionDate,
    Type,
    Description,
    Amount,
    Balance,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderField::BookingDate => "BookingDate",
            HeaderField::TransactionDate => "TransactionDate",
            HeaderField::Type => "Type",
            HeaderField::Description => "Description",
            HeaderField::Amount => "Amount",
            HeaderField::Balance => "Balance",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for HeaderField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bookingdate" => Ok(HeaderField::BookingDate),
            "transactiondate" => Ok(HeaderField::TransactionDate),
            "type" => Ok(HeaderField::Type),
            "description" => Ok(HeaderField::Description),
            "amount" => Ok(HeaderField::Amount),
            "balance" => Ok(HeaderField::Balance),
            other => Err(format!("Unknown header field: '{other}'")),
        }
    }
}

/// One bank profile as loaded from JSON. All sections optional — an override
/// file typically supplies just a couple of aliases or kind keywords.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankProfile {
    pub candidate_separators: Vec<String>,
    pub date_formats: Vec<String>,
    pub header_aliases: HashMap<String, String>,
    pub header_indicator_tokens: Vec<String>,
    pub kind_rules: Vec<KindRuleDef>,
    pub transforms: TransformFlags,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KindRuleDef {
    pub kind: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformFlags {
    pub swish_copy_type_to_description_when_empty: bool,
}

/// Keyword rule after merging: a kind and its normalized keywords.
#[derive(Debug, Clone)]
pub struct KindRule {
    pub kind: TransactionKind,
    pub keywords: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Profile '{profile}' is not valid JSON: {error}")]
    InvalidProfile { profile: String, error: String },
}

/// Effective import configuration after merging base + bank overrides.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub separators: Vec<char>,
    /// chrono format strings tried in order.
    pub date_formats: Vec<String>,
    /// normalized header text -> semantic field.
    pub header_aliases: HashMap<String, HeaderField>,
    /// Broader token set marking a row as header-*like* (skipped, not mapped).
    pub header_indicator_tokens: Vec<String>,
    /// Kind keyword rules in first-seen order; first match wins.
    pub kind_rules: Vec<KindRule>,
    pub transforms: TransformFlags,
}

const FALLBACK_SEPARATORS: &[char] = &['\t', ';', ','];

const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m-%d-%Y", "%m/%d/%Y",
];

impl Default for ImportConfig {
    /// The built-in base profile, tuned for common Swedish bank exports.
    fn default() -> Self {
        let base: BankProfile =
            serde_json::from_str(BASE_PROFILE_JSON).expect("built-in base profile is valid");
        ImportConfig::merge(vec![("builtin".to_string(), base)])
    }
}

impl ImportConfig {
    /// Parse and merge profile sources in order. The first source is the base
    /// profile; the rest are bank overrides.
    pub fn from_sources<'a, I>(sources: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut profiles = Vec::new();
        for (name, json) in sources {
            let profile: BankProfile =
                serde_json::from_str(json).map_err(|e| ConfigError::InvalidProfile {
                    profile: name.to_string(),
                    error: e.to_string(),
                })?;
            profiles.push((name.to_string(), profile));
        }
        Ok(ImportConfig::merge(profiles))
    }

    /// Merge parsed profiles. Conflicting alias/keyword remaps are reported
    /// via `tracing::warn!` and the first mapping wins.
    pub fn merge(sections: Vec<(String, BankProfile)>) -> Self {
        let mut separators: Vec<char> = Vec::new();
        let mut date_formats: Vec<String> = Vec::new();
        let mut header_aliases: HashMap<String, HeaderField> = HashMap::new();
        let mut header_indicator_tokens: Vec<String> = Vec::new();
        let mut keyword_owner: HashMap<String, TransactionKind> = HashMap::new();
        let mut ordered_keywords: Vec<(TransactionKind, String)> = Vec::new();
        let mut transforms = TransformFlags::default();

        for (source, profile) in &sections {
            for sep in &profile.candidate_separators {
                if let Some(ch) = sep.chars().next() {
                    if !separators.contains(&ch) {
                        separators.push(ch);
                    }
                }
            }

            for format in &profile.date_formats {
                let trimmed = format.trim();
                if !trimmed.is_empty() && !date_formats.iter().any(|f| f == trimmed) {
                    date_formats.push(trimmed.to_string());
                }
            }

            for (header, target) in &profile.header_aliases {
                let key = normalize_header(header);
                if key.is_empty() {
                    continue;
                }
                let field: HeaderField = match target.parse() {
                    Ok(field) => field,
                    Err(_) => {
                        tracing::warn!(
                            source,
                            header,
                            target,
                            "header alias targets unknown field"
                        );
                        continue;
                    }
                };
                match header_aliases.get(&key) {
                    Some(existing) if *existing != field => {
                        tracing::warn!(
                            source,
                            header,
                            %field,
                            existing = %existing,
                            "conflicting header alias ignored; first mapping wins"
                        );
                    }
                    Some(_) => {}
                    None => {
                        header_aliases.insert(key, field);
                    }
                }
            }

            for token in &profile.header_indicator_tokens {
                let normalized = normalize_header(token);
                if !normalized.is_empty() && !header_indicator_tokens.contains(&normalized) {
                    header_indicator_tokens.push(normalized);
                }
            }

            for rule in &profile.kind_rules {
                let kind: TransactionKind = match rule.kind.parse() {
                    Ok(kind) => kind,
                    Err(_) => {
                        tracing::warn!(source, kind = %rule.kind, "kind rule references unknown kind");
                        continue;
                    }
                };
                for keyword in &rule.keywords {
                    let normalized = normalize_matching(keyword).trim().to_string();
                    if normalized.is_empty() {
                        continue;
                    }
                    match keyword_owner.get(&normalized) {
                        Some(existing) if *existing != kind => {
                            tracing::warn!(
                                source,
                                keyword = %keyword,
                                kind = %kind,
                                existing = %existing,
                                "conflicting kind keyword ignored; first mapping wins"
                            );
                        }
                        Some(_) => {}
                        None => {
                            keyword_owner.insert(normalized.clone(), kind);
                            ordered_keywords.push((kind, normalized));
                        }
                    }
                }
            }

            if profile.transforms.swish_copy_type_to_description_when_empty {
                transforms.swish_copy_type_to_description_when_empty = true;
            }
        }

        if separators.is_empty() {
            tracing::warn!("no separators after merging profiles; using fallbacks");
            separators.extend_from_slice(FALLBACK_SEPARATORS);
        }
        if date_formats.is_empty() {
            tracing::warn!("no date formats after merging profiles; using fallbacks");
            date_formats.extend(FALLBACK_DATE_FORMATS.iter().map(|s| s.to_string()));
        }

        // Group ordered keywords back into per-kind rules, preserving order.
        let mut kind_rules: Vec<KindRule> = Vec::new();
        for (kind, keyword) in ordered_keywords {
            match kind_rules.iter_mut().find(|rule| rule.kind == kind) {
                Some(rule) => rule.keywords.push(keyword),
                None => kind_rules.push(KindRule {
                    kind,
                    keywords: vec![keyword],
                }),
            }
        }

        ImportConfig {
            separators,
            date_formats,
            header_aliases,
            header_indicator_tokens,
            kind_rules,
            transforms,
        }
    }

    /// All kind keywords flattened, for type-column profiling.
    pub fn type_keywords(&self) -> Vec<&str> {
        self.kind_rules
            .iter()
            .flat_map(|rule| rule.keywords.iter().map(String::as_str))
            .collect()
    }

    /// Map a row's type text / descriptions to a transaction kind. Checks the
    /// raw type first, then the normalized description, then the original
    /// description; the first keyword hit wins.
    pub fn map_kind(
        &self,
        type_raw: Option<&str>,
        normalized_description: &str,
        description: &str,
    ) -> TransactionKind {
        let haystacks = [
            type_raw.map(normalize_matching),
            Some(normalize_matching(normalized_description)),
            Some(normalize_matching(description)),
        ];

        for rule in &self.kind_rules {
            for keyword in &rule.keywords {
                for haystack in haystacks.iter().flatten() {
                    if haystack.contains(keyword.as_str()) {
                        return rule.kind;
                    }
                }
            }
        }

        tracing::debug!(
            type_raw = type_raw.unwrap_or("<empty>"),
            description,
            "no kind keyword matched; defaulting to Unknown"
        );
        TransactionKind::Unknown
    }
}

/// Built-in base profile, merged ahead of any bank override files, which
/// follow the same shape.
pub const BASE_PROFILE_JSON: &str = r#"{
    "candidateSeparators": ["\t", ";", ","],
    "dateFormats": ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m-%d-%Y", "%m/%d/%Y"],
    "headerAliases": {
        "Transaktionsdatum": "TransactionDate",
        "Transactiondate": "TransactionDate",
        "Bokföringsdatum": "BookingDate",
        "Bookingdate": "BookingDate",
        "Meddelande": "Description",
        "Meddelandetext": "Description",
        "Text": "Description",
        "Textmeddelande": "Description",
        "Beskrivning": "Description",
        "Referens": "Description",
        "Motpart": "Description",
        "Transaktionstyp": "Type",
        "Transactiontype": "Type",
        "Typ": "Type",
        "Type": "Type",
        "Belopp": "Amount",
        "Insättning/Uttag": "Amount",
        "Amount": "Amount",
        "Saldo": "Balance",
        "Behållning": "Balance",
        "Balans": "Balance",
        "Balance": "Balance"
    },
    "headerIndicatorTokens": [
        "datum", "date", "belopp", "amount", "saldo", "balance",
        "text", "typ", "type", "meddelande", "referens", "beskrivning"
    ],
    "kindRules": [
        { "kind": "CardPurchase", "keywords": ["Kortköp"] },
        { "kind": "Swish", "keywords": ["swish"] },
        { "kind": "Payment", "keywords": ["Betalning", "Autogiro"] },
        { "kind": "Fee", "keywords": ["Avg", "Årsavg"] },
        { "kind": "Transfer", "keywords": ["Överföring"] },
        { "kind": "Deposit", "keywords": ["Insättning", "Kontantinsättning"] },
        { "kind": "LoanPayment", "keywords": ["Låneinbetalning"] },
        { "kind": "Interest", "keywords": ["Ränta"] },
        { "kind": "Adjustment", "keywords": ["Rabatt"] }
    ],
    "transforms": { "swishCopyTypeToDescriptionWhenEmpty": true }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_fallback_separators_and_aliases() {
        let config = ImportConfig::default();
        assert_eq!(config.separators, vec!['\t', ';', ',']);
        assert_eq!(
            config.header_aliases.get("bokforingsdatum"),
            Some(&HeaderField::BookingDate)
        );
        assert_eq!(
            config.header_aliases.get("insattninguttag"),
            Some(&HeaderField::Amount)
        );
    }

    #[test]
    fn empty_profile_falls_back_to_hardcoded_defaults() {
        let config = ImportConfig::merge(vec![("empty".to_string(), BankProfile::default())]);
        assert_eq!(config.separators, vec!['\t', ';', ',']);
        assert_eq!(config.date_formats.len(), 6);
    }

    #[test]
    fn bank_override_adds_but_does_not_replace() {
        let bank: BankProfile = serde_json::from_str(
            r#"{
                "headerAliases": { "Datum": "TransactionDate", "Belopp": "Balance" },
                "kindRules": [ { "kind": "Fee", "keywords": ["uttagsavgift"] } ]
            }"#,
        )
        .unwrap();
        let base: BankProfile = serde_json::from_str(BASE_PROFILE_JSON).unwrap();
        let config = ImportConfig::merge(vec![
            ("base".to_string(), base),
            ("banks/testbank.json".to_string(), bank),
        ]);

        // New alias added.
        assert_eq!(
            config.header_aliases.get("datum"),
            Some(&HeaderField::TransactionDate)
        );
        // Conflicting remap of Belopp ignored — first mapping wins.
        assert_eq!(
            config.header_aliases.get("belopp"),
            Some(&HeaderField::Amount)
        );
        // New fee keyword appended to the existing rule.
        let fee_rule = config
            .kind_rules
            .iter()
            .find(|r| r.kind == TransactionKind::Fee)
            .unwrap();
        assert!(fee_rule.keywords.iter().any(|k| k == "uttagsavgift"));
    }

    #[test]
    fn map_kind_checks_type_then_descriptions() {
        let config = ImportConfig::default();
        assert_eq!(
            config.map_kind(Some("Kortköp"), "hobbex se", "HOBBEX.SE"),
            TransactionKind::CardPurchase
        );
        assert_eq!(
            config.map_kind(None, "swish fran anna", "Swish från Anna"),
            TransactionKind::Swish
        );
        assert_eq!(
            config.map_kind(Some("???"), "mystery", "mystery"),
            TransactionKind::Unknown
        );
    }

    #[test]
    fn invalid_profile_json_is_reported() {
        let result = ImportConfig::from_sources([("broken.json", "{ not json")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidProfile { profile, .. }) if profile == "broken.json"
        ));
    }

    #[test]
    fn unknown_kind_and_field_names_are_skipped() {
        let profile: BankProfile = serde_json::from_str(
            r#"{
                "headerAliases": { "Foo": "NotAField" },
                "kindRules": [ { "kind": "Lottery", "keywords": ["jackpot"] } ]
            }"#,
        )
        .unwrap();
        let config = ImportConfig::merge(vec![("bad".to_string(), profile)]);
        assert!(config.header_aliases.is_empty());
        assert!(config.kind_rules.is_empty());
    }
}
