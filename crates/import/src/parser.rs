//! Row parsing under a resolved schema, plus fingerprint dedup planning.

use std::collections::HashMap;
use thiserror::Error;

use crate::config::ImportConfig;
use crate::layout::{RawRow, RowClass};
use crate::schema::ResolvedSchema;
use crate::value::{parse_amount, parse_date};
use kassabok_core::{normalize_text, ParsedTransaction};

/// Why one row was skipped. The import continues past these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowErrorKind {
    #[error("Row has {found} columns but {expected} were expected")]
    ColumnCountMismatch { found: usize, expected: usize },
    #[error("Invalid transaction date: \"{0}\"")]
    InvalidDate(String),
    #[error("Invalid booking date: \"{0}\"")]
    InvalidBookingDate(String),
    #[error("Description is missing")]
    MissingDescription,
    #[error("Invalid amount: \"{0}\"")]
    InvalidAmount(String),
    #[error("Invalid balance: \"{0}\"")]
    InvalidBalance(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line number in the pasted text.
    pub line: usize,
    pub kind: RowErrorKind,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.kind)
    }
}

/// Parsed rows plus the row-level errors collected along the way. Import
/// identifiers are assigned later by [`plan_import`].
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub transactions: Vec<ParsedTransaction>,
    pub errors: Vec<RowError>,
}

/// Parse every data row below the header under the resolved schema.
pub fn parse_rows(
    rows: &[RawRow],
    resolved: &ResolvedSchema,
    config: &ImportConfig,
) -> ParseOutcome {
    let schema = &resolved.schema;
    let mut outcome = ParseOutcome::default();

    for row in rows {
        if row.class != RowClass::DataCandidate {
            continue;
        }
        if let Some(header_line) = resolved.header_line {
            if row.line_number <= header_line {
                continue;
            }
        }

        if row.cells.len() != schema.column_count {
            outcome.errors.push(RowError {
                line: row.line_number,
                kind: RowErrorKind::ColumnCountMismatch {
                    found: row.cells.len(),
                    expected: schema.column_count,
                },
            });
            continue;
        }

        let date_cell = &row.cells[schema.transaction_date];
        let Some(transaction_date) = parse_date(date_cell, &config.date_formats) else {
            outcome.errors.push(RowError {
                line: row.line_number,
                kind: RowErrorKind::InvalidDate(date_cell.clone()),
            });
            continue;
        };

        let mut description = row.cells[schema.description].clone();
        let type_raw = schema
            .transaction_type
            .map(|i| row.cells[i].clone())
            .filter(|t| !t.is_empty());

        // Swish exports leave the description blank and put the counterparty
        // in the type column.
        if description.is_empty()
            && config.transforms.swish_copy_type_to_description_when_empty
        {
            if let Some(type_text) = &type_raw {
                if type_text.to_lowercase().contains("swish") {
                    description = type_text.clone();
                }
            }
        }
        if description.is_empty() {
            outcome.errors.push(RowError {
                line: row.line_number,
                kind: RowErrorKind::MissingDescription,
            });
            continue;
        }

        let amount_cell = &row.cells[schema.amount];
        let Some(amount) = parse_amount(amount_cell) else {
            outcome.errors.push(RowError {
                line: row.line_number,
                kind: RowErrorKind::InvalidAmount(amount_cell.clone()),
            });
            continue;
        };

        let mut balance = None;
        if let Some(index) = schema.balance {
            let cell = &row.cells[index];
            if !cell.is_empty() {
                match parse_amount(cell) {
                    Some(parsed) => balance = Some(parsed),
                    None => {
                        outcome.errors.push(RowError {
                            line: row.line_number,
                            kind: RowErrorKind::InvalidBalance(cell.clone()),
                        });
                        continue;
                    }
                }
            }
        }

        let mut booking_date = None;
        if let Some(index) = schema.booking_date {
            let cell = &row.cells[index];
            if !cell.is_empty() {
                match parse_date(cell, &config.date_formats) {
                    Some(parsed) => booking_date = Some(parsed),
                    None => {
                        outcome.errors.push(RowError {
                            line: row.line_number,
                            kind: RowErrorKind::InvalidBookingDate(cell.clone()),
                        });
                        continue;
                    }
                }
            }
        }

        let normalized_description = normalize_text(&description);
        let kind = config.map_kind(type_raw.as_deref(), &normalized_description, &description);

        outcome.transactions.push(ParsedTransaction {
            booking_date,
            transaction_date,
            description,
            normalized_description,
            amount,
            balance,
            type_raw,
            kind,
            source_line: row.line_number,
            raw_row: row.text.clone(),
            import_id: String::new(),
        });
    }

    tracing::debug!(
        parsed = outcome.transactions.len(),
        skipped = outcome.errors.len(),
        "rows parsed"
    );
    outcome
}

/// A fingerprint group rejected because storage already holds transactions
/// with the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint_key: String,
    /// Sample description for the warning message.
    pub description: String,
    pub row_count: usize,
    pub existing_count: i64,
}

/// The dedup-resolved import: what to insert and what to warn about.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub accepted: Vec<ParsedTransaction>,
    pub duplicates: Vec<DuplicateGroup>,
}

/// Assign import identifiers and resolve duplicates.
///
/// Transactions are grouped by fingerprint. A group whose fingerprint already
/// exists in storage is rejected wholesale with one warning. Accepted rows get
/// `{fingerprint}:{ordinal}` identifiers, the ordinal offset by the stored
/// count, so repeated same-day/same-description/same-amount rows within one
/// statement stay individually importable.
pub fn plan_import(
    transactions: Vec<ParsedTransaction>,
    existing_counts: &HashMap<String, i64>,
) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ParsedTransaction>> = HashMap::new();

    for transaction in transactions {
        let key = transaction.fingerprint().key();
        if !groups.contains_key(&key) {
            group_order.push(key.clone());
        }
        groups.entry(key).or_default().push(transaction);
    }

    for key in group_order {
        let mut group = groups.remove(&key).unwrap_or_default();
        let existing = existing_counts.get(&key).copied().unwrap_or(0);
        if existing > 0 {
            tracing::warn!(
                fingerprint = %key,
                rows = group.len(),
                existing,
                "fingerprint already imported; rejecting the whole group"
            );
            plan.duplicates.push(DuplicateGroup {
                fingerprint_key: key,
                description: group
                    .first()
                    .map(|t| t.description.clone())
                    .unwrap_or_default(),
                row_count: group.len(),
                existing_count: existing,
            });
            continue;
        }
        for (offset, transaction) in group.iter_mut().enumerate() {
            let fingerprint = transaction.fingerprint();
            transaction.import_id = fingerprint.import_id(existing as usize + offset);
        }
        plan.accepted.extend(group);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::detect_layout;
    use crate::profile::EmptySignatureIndex;
    use crate::schema::resolve_schema;
    use chrono::NaiveDate;
    use kassabok_core::TransactionKind;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn parse(raw: &str) -> ParseOutcome {
        let config = ImportConfig::default();
        let layout = detect_layout(raw, &config).unwrap();
        let resolved = resolve_schema(&layout, &config, &EmptySignatureIndex, None).unwrap();
        parse_rows(&layout.rows, &resolved, &config)
    }

    #[test]
    fn parses_a_headered_export() {
        let raw = "Bokföringsdatum\tTransaktionsdatum\tTyp\tText\tBelopp\tSaldo\n\
                   2024-01-03\t2024-01-02\tKortköp\tICA KVANTUM\t-123,45\t990,00\n";
        let outcome = parse(raw);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.transactions.len(), 1);
        let t = &outcome.transactions[0];
        assert_eq!(t.booking_date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(
            t.transaction_date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(t.description, "ICA KVANTUM");
        assert_eq!(t.normalized_description, "ica kvantum");
        assert_eq!(t.amount, Decimal::from_str("-123.45").unwrap());
        assert_eq!(t.balance, Some(Decimal::from_str("990.00").unwrap()));
        assert_eq!(t.kind, TransactionKind::CardPurchase);
        assert!(t.import_id.is_empty());
    }

    #[test]
    fn required_field_failures_skip_the_row_and_continue() {
        let raw = "Transaktionsdatum\tText\tBelopp\n\
                   inte ett datum\tICA\t-10,00\n\
                   2024-01-03\t\t-20,00\n\
                   2024-01-04\tCOOP\tabc\n\
                   2024-01-05\tWILLYS\t-30,00\n";
        let outcome = parse(raw);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].description, "WILLYS");
        assert_eq!(outcome.errors.len(), 3);
        assert!(matches!(outcome.errors[0].kind, RowErrorKind::InvalidDate(_)));
        assert_eq!(outcome.errors[1].kind, RowErrorKind::MissingDescription);
        assert!(matches!(outcome.errors[2].kind, RowErrorKind::InvalidAmount(_)));
    }

    #[test]
    fn rows_wider_than_the_schema_are_rejected_not_truncated() {
        let raw = "Transaktionsdatum\tText\tBelopp\n\
                   2024-01-02\tICA\t-10,00\n\
                   2024-01-03\tWILLYS\t-15,00\n\
                   2024-01-04\tCOOP\t-20,00\textra\n";
        let outcome = parse(raw);
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(
            outcome.errors[0].kind,
            RowErrorKind::ColumnCountMismatch {
                found: 4,
                expected: 3
            }
        );
    }

    #[test]
    fn blank_optional_fields_pass_but_garbage_does_not() {
        let raw = "Bokföringsdatum\tTransaktionsdatum\tText\tBelopp\tSaldo\n\
                   \t2024-01-02\tICA\t-10,00\t\n\
                   trasigt\t2024-01-03\tCOOP\t-20,00\t990,00\n";
        let outcome = parse(raw);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].booking_date, None);
        assert_eq!(outcome.transactions[0].balance, None);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0].kind,
            RowErrorKind::InvalidBookingDate(_)
        ));
    }

    #[test]
    fn swish_transform_fills_a_blank_description() {
        let raw = "Transaktionsdatum\tTyp\tText\tBelopp\n\
                   2024-01-02\tSwish mottagen ANNA\t\t50,00\n";
        let outcome = parse(raw);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].description, "Swish mottagen ANNA");
        assert_eq!(outcome.transactions[0].kind, TransactionKind::Swish);
    }

    #[test]
    fn short_rows_are_reported_as_column_count_mismatch() {
        let raw = "Transaktionsdatum\tText\tBelopp\n\
                   2024-01-02\tICA\n\
                   2024-01-03\tCOOP\t-20,00\n";
        let outcome = parse(raw);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(
            outcome.errors[0].kind,
            RowErrorKind::ColumnCountMismatch {
                found: 2,
                expected: 3
            }
        );
    }

    fn tx(date: &str, description: &str, amount: &str) -> ParsedTransaction {
        ParsedTransaction {
            booking_date: None,
            transaction_date: NaiveDate::from_str(date).unwrap(),
            description: description.to_string(),
            normalized_description: normalize_text(description),
            amount: Decimal::from_str(amount).unwrap(),
            balance: None,
            type_raw: None,
            kind: TransactionKind::Unknown,
            source_line: 1,
            raw_row: String::new(),
            import_id: String::new(),
        }
    }

    #[test]
    fn fresh_fingerprints_get_sequential_import_ids() {
        let rows = vec![
            tx("2024-01-02", "ICA", "-10.00"),
            tx("2024-01-02", "ICA", "-10.00"),
            tx("2024-01-03", "COOP", "-20.00"),
        ];
        let plan = plan_import(rows, &HashMap::new());
        assert_eq!(plan.accepted.len(), 3);
        assert!(plan.duplicates.is_empty());
        let first_key = plan.accepted[0].fingerprint().key();
        assert_eq!(plan.accepted[0].import_id, format!("{first_key}:0"));
        assert_eq!(plan.accepted[1].import_id, format!("{first_key}:1"));
        assert!(plan.accepted[2].import_id.ends_with(":0"));
    }

    #[test]
    fn a_seen_fingerprint_rejects_its_whole_group() {
        let rows = vec![
            tx("2024-01-02", "ICA", "-10.00"),
            tx("2024-01-02", "ICA", "-10.00"),
            tx("2024-01-03", "COOP", "-20.00"),
        ];
        let seen_key = rows[0].fingerprint().key();
        let existing = HashMap::from([(seen_key.clone(), 2_i64)]);
        let plan = plan_import(rows, &existing);
        assert_eq!(plan.accepted.len(), 1);
        assert_eq!(plan.accepted[0].description, "COOP");
        assert_eq!(plan.duplicates.len(), 1);
        assert_eq!(plan.duplicates[0].fingerprint_key, seen_key);
        assert_eq!(plan.duplicates[0].row_count, 2);
        assert_eq!(plan.duplicates[0].existing_count, 2);
    }

    #[test]
    fn reimporting_everything_accepts_nothing() {
        let rows = vec![
            tx("2024-01-02", "ICA", "-10.00"),
            tx("2024-01-03", "COOP", "-20.00"),
        ];
        let existing: HashMap<String, i64> = rows
            .iter()
            .map(|t| (t.fingerprint().key(), 1_i64))
            .collect();
        let plan = plan_import(rows, &existing);
        assert!(plan.accepted.is_empty());
        assert_eq!(plan.duplicates.len(), 2);
    }
}
