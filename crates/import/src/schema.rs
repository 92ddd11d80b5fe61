//! Schema resolution: header matching, solver fallback, manual override.

use thiserror::Error;

use crate::config::{HeaderField, ImportConfig};
use crate::layout::{DetectedLayout, RawRow};
use crate::profile::{profile_columns, SignatureIndex};
use crate::solver::{solve, ColumnMap};
use kassabok_core::normalize_header;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("No date column could be resolved")]
    NoDateColumn,
    #[error("No description column could be resolved")]
    NoDescriptionColumn,
    #[error("No amount column could be resolved")]
    NoAmountColumn,
    #[error("Column index {index} is outside the detected {column_count} columns")]
    IndexOutOfRange { index: usize, column_count: usize },
    #[error("Column index {index} is assigned to more than one field")]
    DuplicateIndex { index: usize },
}

/// Physical column positions for each semantic field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Schema {
    pub booking_date: Option<usize>,
    pub transaction_date: usize,
    pub transaction_type: Option<usize>,
    pub description: usize,
    pub amount: usize,
    pub balance: Option<usize>,
    pub column_count: usize,
}

/// How the schema was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SchemaSource {
    Header,
    Inferred,
    Manual,
}

#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Schema,
    pub confidence: f64,
    /// 1-based line of the header (or header-like) row that was consumed.
    pub header_line: Option<usize>,
    pub source: SchemaSource,
    /// Solver diagnostics when the schema was inferred.
    pub column_map: Option<ColumnMap>,
}

/// Caller-supplied column indices; bypasses detection but not validation.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualSchema {
    pub booking_date: Option<usize>,
    pub transaction_date: Option<usize>,
    pub transaction_type: Option<usize>,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub balance: Option<usize>,
}

impl ManualSchema {
    fn validate(&self, column_count: usize) -> Result<Schema, SchemaError> {
        let assigned = [
            self.booking_date,
            self.transaction_date,
            self.transaction_type,
            self.description,
            self.amount,
            self.balance,
        ];
        for index in assigned.iter().flatten() {
            if *index >= column_count {
                return Err(SchemaError::IndexOutOfRange {
                    index: *index,
                    column_count,
                });
            }
        }
        // Booking and transaction date may legitimately share a column;
        // everything else must be distinct.
        let mut seen: Vec<usize> = Vec::new();
        for index in [
            self.transaction_date,
            self.transaction_type,
            self.description,
            self.amount,
            self.balance,
        ]
        .iter()
        .flatten()
        {
            if seen.contains(index) {
                return Err(SchemaError::DuplicateIndex { index: *index });
            }
            seen.push(*index);
        }
        if let Some(index) = self.booking_date {
            if self.transaction_date != Some(index) && seen.contains(&index) {
                return Err(SchemaError::DuplicateIndex { index });
            }
        }

        let transaction_date = self
            .transaction_date
            .or(self.booking_date)
            .ok_or(SchemaError::NoDateColumn)?;
        let description = self.description.ok_or(SchemaError::NoDescriptionColumn)?;
        let amount = self.amount.ok_or(SchemaError::NoAmountColumn)?;
        Ok(Schema {
            booking_date: self.booking_date,
            transaction_date,
            transaction_type: self.transaction_type,
            description,
            amount,
            balance: self.balance,
            column_count,
        })
    }
}

/// Resolve the schema for a detected layout.
///
/// Order of attempts: caller-supplied manual schema, exact header match,
/// header-like skip plus the column-guessing solver.
pub fn resolve_schema(
    layout: &DetectedLayout,
    config: &ImportConfig,
    signatures: &dyn SignatureIndex,
    manual: Option<&ManualSchema>,
) -> Result<ResolvedSchema, SchemaError> {
    if let Some(manual) = manual {
        let schema = manual.validate(layout.column_count)?;
        return Ok(ResolvedSchema {
            schema,
            confidence: 1.0,
            header_line: find_header_row(&layout.rows, config).map(|(line, _)| line),
            source: SchemaSource::Manual,
            column_map: None,
        });
    }

    if let Some((line, schema)) = find_header_row(&layout.rows, config) {
        let schema = validate_header_schema(schema, layout.column_count)?;
        return Ok(ResolvedSchema {
            schema,
            confidence: 1.0,
            header_line: Some(line),
            source: SchemaSource::Header,
            column_map: None,
        });
    }

    let header_like = find_header_like_row(&layout.rows, config);
    let data_rows: Vec<RawRow> = layout
        .rows
        .iter()
        .filter(|r| header_like.map_or(true, |line| r.line_number > line))
        .cloned()
        .collect();

    let profiles = profile_columns(&data_rows, layout.column_count, config, signatures);
    let map = solve(&profiles);
    let transaction_date = map
        .transaction_date
        .or(map.booking_date)
        .ok_or(SchemaError::NoDateColumn)?;
    let description = map.description.ok_or(SchemaError::NoDescriptionColumn)?;
    let amount = map.amount.ok_or(SchemaError::NoAmountColumn)?;

    let schema = Schema {
        booking_date: map.booking_date,
        transaction_date,
        transaction_type: map.transaction_type,
        description,
        amount,
        balance: map.balance,
        column_count: layout.column_count,
    };
    let confidence = (map.total_score / 5.0).min(1.0);
    tracing::debug!(?schema, confidence, "schema inferred from column profiles");

    Ok(ResolvedSchema {
        schema,
        confidence,
        header_line: header_like,
        source: SchemaSource::Inferred,
        column_map: Some(map),
    })
}

/// Partial schema read off a header row's alias matches.
struct HeaderSchema {
    booking_date: Option<usize>,
    transaction_date: Option<usize>,
    transaction_type: Option<usize>,
    description: Option<usize>,
    amount: Option<usize>,
    balance: Option<usize>,
}

/// First row whose aliases resolve at least two required fields. The first
/// column claiming a field wins; later duplicates are ignored.
fn find_header_row(rows: &[RawRow], config: &ImportConfig) -> Option<(usize, HeaderSchema)> {
    for row in rows {
        let mut schema = HeaderSchema {
            booking_date: None,
            transaction_date: None,
            transaction_type: None,
            description: None,
            amount: None,
            balance: None,
        };
        for (index, cell) in row.cells.iter().enumerate() {
            let Some(field) = config.header_aliases.get(&normalize_header(cell)) else {
                continue;
            };
            let slot = match field {
                HeaderField::BookingDate => &mut schema.booking_date,
                HeaderField::TransactionDate => &mut schema.transaction_date,
                HeaderField::Type => &mut schema.transaction_type,
                HeaderField::Description => &mut schema.description,
                HeaderField::Amount => &mut schema.amount,
                HeaderField::Balance => &mut schema.balance,
            };
            if slot.is_none() {
                *slot = Some(index);
            }
        }
        let required = [
            schema.transaction_date.or(schema.booking_date),
            schema.description,
            schema.amount,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count();
        if required >= 2 {
            return Some((row.line_number, schema));
        }
    }
    None
}

fn validate_header_schema(header: HeaderSchema, column_count: usize) -> Result<Schema, SchemaError> {
    // The header row can be wider than the modal data rows. Aliases pointing
    // past the data column count map to cells that never exist; drop them.
    let clip = |index: Option<usize>| index.filter(|i| *i < column_count);
    let booking_date = clip(header.booking_date);
    let transaction_date = clip(header.transaction_date)
        .or(booking_date)
        .ok_or(SchemaError::NoDateColumn)?;
    let description = clip(header.description).ok_or(SchemaError::NoDescriptionColumn)?;
    let amount = clip(header.amount).ok_or(SchemaError::NoAmountColumn)?;
    Ok(Schema {
        booking_date,
        transaction_date,
        transaction_type: clip(header.transaction_type),
        description,
        amount,
        balance: clip(header.balance),
        column_count,
    })
}

/// First row with two or more cells containing broader header-indicator
/// tokens. Such a row is skipped before profiling, never mapped.
fn find_header_like_row(rows: &[RawRow], config: &ImportConfig) -> Option<usize> {
    rows.iter()
        .find(|row| {
            let hits = row
                .cells
                .iter()
                .filter(|cell| {
                    let normalized = normalize_header(cell);
                    !normalized.is_empty()
                        && config
                            .header_indicator_tokens
                            .iter()
                            .any(|token| normalized.contains(token))
                })
                .count();
            hits >= 2
        })
        .map(|row| row.line_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::detect_layout;
    use crate::profile::EmptySignatureIndex;

    fn resolve(raw: &str, manual: Option<&ManualSchema>) -> Result<ResolvedSchema, SchemaError> {
        let config = ImportConfig::default();
        let layout = detect_layout(raw, &config).unwrap();
        resolve_schema(&layout, &config, &EmptySignatureIndex, manual)
    }

    #[test]
    fn exact_header_row_wins_with_full_confidence() {
        let raw = "Bokföringsdatum\tTransaktionsdatum\tText\tBelopp\tSaldo\n\
                   2024-01-02\t2024-01-02\tICA\t-10,00\t990,00\n";
        let resolved = resolve(raw, None).unwrap();
        assert_eq!(resolved.source, SchemaSource::Header);
        assert_eq!(resolved.confidence, 1.0);
        assert_eq!(resolved.header_line, Some(1));
        assert_eq!(resolved.schema.booking_date, Some(0));
        assert_eq!(resolved.schema.transaction_date, 1);
        assert_eq!(resolved.schema.description, 2);
        assert_eq!(resolved.schema.amount, 3);
        assert_eq!(resolved.schema.balance, Some(4));
    }

    #[test]
    fn header_with_only_booking_date_still_resolves_a_date() {
        let raw = "Bokföringsdatum\tText\tBelopp\n2024-01-02\tICA\t-10,00\n";
        let resolved = resolve(raw, None).unwrap();
        assert_eq!(resolved.schema.transaction_date, 0);
        assert_eq!(resolved.schema.booking_date, Some(0));
    }

    #[test]
    fn headerless_input_falls_back_to_inference() {
        let raw = "2025-12-18\t2025-12-18\tInsättning\tPENSION KPA\t73,00\n\
                   2025-12-18\t2025-12-17\tKortköp\tHOBBEX.SE,STOCKHOLM,SE\t-967,20\n";
        let resolved = resolve(raw, None).unwrap();
        assert_eq!(resolved.source, SchemaSource::Inferred);
        assert!(resolved.confidence > 0.0 && resolved.confidence <= 1.0);
        assert_eq!(resolved.schema.booking_date, Some(0));
        assert_eq!(resolved.schema.transaction_date, 1);
        assert_eq!(resolved.schema.description, 3);
        assert_eq!(resolved.schema.amount, 4);
        assert!(resolved.column_map.is_some());
    }

    #[test]
    fn header_like_row_is_skipped_before_inference() {
        // No cell is an exact alias, but two cells carry indicator tokens.
        let raw = "Datum\tInformation\tBelopp i SEK\n\
                   2024-01-02\tICA KVANTUM\t-10,00\n\
                   2024-01-03\tCOOP FORUM\t-20,00\n";
        let resolved = resolve(raw, None).unwrap();
        assert_eq!(resolved.source, SchemaSource::Inferred);
        assert_eq!(resolved.header_line, Some(1));
        assert_eq!(resolved.schema.transaction_date, 0);
        assert_eq!(resolved.schema.amount, 2);
    }

    #[test]
    fn single_indicator_cell_is_not_header_like() {
        let raw = "Datum här\tVad\tKostnad\n\
                   2024-01-02\tICA KVANTUM\t-10,00\n";
        let config = ImportConfig::default();
        let layout = detect_layout(raw, &config).unwrap();
        assert_eq!(find_header_like_row(&layout.rows, &config), None);
    }

    #[test]
    fn missing_amount_column_aborts() {
        let raw = "Bokföringsdatum\tText\tTyp\n2024-01-02\tICA\tKortköp\n";
        // Header resolves date + description but no amount.
        assert_eq!(resolve(raw, None).unwrap_err(), SchemaError::NoAmountColumn);
    }

    #[test]
    fn header_aliases_past_the_data_width_are_dropped() {
        // Five header cells over three-cell data rows; the Text and Belopp
        // aliases land beyond the modal column count and must not survive
        // into the schema.
        let raw = "Transaktionsdatum\tExtra\tOvrigt\tText\tBelopp\n\
                   2024-01-02\tICA\t-10,00\n\
                   2024-01-03\tCOOP\t-20,00\n";
        let result = resolve(raw, None);
        assert!(matches!(
            result,
            Err(SchemaError::NoDescriptionColumn | SchemaError::NoAmountColumn)
        ));
    }

    #[test]
    fn manual_schema_bypasses_detection() {
        let raw = "aaa\tbbb\tccc\tddd\n2024-01-02\tICA\t-10,00\txxx\n";
        let manual = ManualSchema {
            transaction_date: Some(0),
            description: Some(1),
            amount: Some(2),
            ..ManualSchema::default()
        };
        let resolved = resolve(raw, Some(&manual)).unwrap();
        assert_eq!(resolved.source, SchemaSource::Manual);
        assert_eq!(resolved.schema.transaction_date, 0);
        assert_eq!(resolved.schema.amount, 2);
    }

    #[test]
    fn manual_schema_rejects_bad_indices() {
        let raw = "2024-01-02\tICA\t-10,00\n2024-01-03\tCOOP\t-20,00\n";
        let out_of_range = ManualSchema {
            transaction_date: Some(0),
            description: Some(1),
            amount: Some(9),
            ..ManualSchema::default()
        };
        assert_eq!(
            resolve(raw, Some(&out_of_range)).unwrap_err(),
            SchemaError::IndexOutOfRange {
                index: 9,
                column_count: 3
            }
        );

        let duplicated = ManualSchema {
            transaction_date: Some(0),
            description: Some(1),
            amount: Some(1),
            ..ManualSchema::default()
        };
        assert_eq!(
            resolve(raw, Some(&duplicated)).unwrap_err(),
            SchemaError::DuplicateIndex { index: 1 }
        );
    }

    #[test]
    fn manual_booking_date_may_only_share_with_transaction_date() {
        let raw = "2024-01-02\tICA\t-10,00\n2024-01-03\tCOOP\t-20,00\n";
        let shared_with_description = ManualSchema {
            booking_date: Some(1),
            transaction_date: Some(0),
            description: Some(1),
            amount: Some(2),
            ..ManualSchema::default()
        };
        assert_eq!(
            resolve(raw, Some(&shared_with_description)).unwrap_err(),
            SchemaError::DuplicateIndex { index: 1 }
        );

        let shared_with_transaction_date = ManualSchema {
            booking_date: Some(0),
            transaction_date: Some(0),
            description: Some(1),
            amount: Some(2),
            ..ManualSchema::default()
        };
        let resolved = resolve(raw, Some(&shared_with_transaction_date)).unwrap();
        assert_eq!(resolved.schema.booking_date, Some(0));
        assert_eq!(resolved.schema.transaction_date, 0);
    }
}
