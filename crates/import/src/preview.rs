//! Operator-facing preview of an import before anything is committed.

use serde::Serialize;

use crate::config::{HeaderField, ImportConfig};
use crate::layout::{DetectedLayout, RowClass};
use crate::parser::{parse_rows, RowError};
use crate::profile::SignatureIndex;
use crate::schema::{ResolvedSchema, Schema, SchemaSource};

/// Classification of one input line in the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    Accepted,
    Header,
    NonData,
    InvalidColumnCount,
    ParseError,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub line: usize,
    pub raw: String,
    pub status: RowStatus,
    /// Human-readable reason for anything not accepted.
    pub reason: Option<String>,
    pub cells: Vec<String>,
}

/// Per-column hint shown next to the detected mapping.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnHint {
    pub index: usize,
    pub display_name: String,
    pub suggested_field: Option<HeaderField>,
}

#[derive(Debug, Serialize)]
pub struct ImportPreview {
    pub separator: char,
    pub column_count: usize,
    pub layout_confidence: f64,
    pub schema_confidence: f64,
    pub schema: Schema,
    pub schema_source: SchemaSource,
    pub header_line: Option<usize>,
    pub columns: Vec<ColumnHint>,
    pub rows: Vec<PreviewRow>,
}

/// Assemble the preview from a detected layout and resolved schema. Rows are
/// parsed for real so the per-row statuses match what a commit would do.
pub fn build_preview(
    layout: &DetectedLayout,
    resolved: &ResolvedSchema,
    config: &ImportConfig,
    _signatures: &dyn SignatureIndex,
) -> ImportPreview {
    let outcome = parse_rows(&layout.rows, resolved, config);
    let errors_by_line: Vec<&RowError> = outcome.errors.iter().collect();
    let accepted_lines: Vec<usize> = outcome
        .transactions
        .iter()
        .map(|t| t.source_line)
        .collect();

    let rows = layout
        .rows
        .iter()
        .map(|row| {
            let header = resolved.header_line == Some(row.line_number)
                || row.class == RowClass::Header;
            let (status, reason) = if header {
                (RowStatus::Header, None)
            } else if row.class == RowClass::NonData {
                (RowStatus::NonData, None)
            } else if accepted_lines.contains(&row.line_number) {
                (RowStatus::Accepted, None)
            } else {
                match errors_by_line
                    .iter()
                    .find(|e| e.line == row.line_number)
                {
                    Some(error) => {
                        let status = match error.kind {
                            crate::parser::RowErrorKind::ColumnCountMismatch { .. } => {
                                RowStatus::InvalidColumnCount
                            }
                            _ => RowStatus::ParseError,
                        };
                        (status, Some(error.kind.to_string()))
                    }
                    // Data rows above the skipped header-like line.
                    None => (RowStatus::NonData, None),
                }
            };
            PreviewRow {
                line: row.line_number,
                raw: row.text.clone(),
                status,
                reason,
                cells: row.cells.clone(),
            }
        })
        .collect();

    let columns = (0..layout.column_count)
        .map(|index| {
            let schema = &resolved.schema;
            let suggested_field = if schema.booking_date == Some(index) {
                Some(HeaderField::BookingDate)
            } else if schema.transaction_date == index {
                Some(HeaderField::TransactionDate)
            } else if schema.transaction_type == Some(index) {
                Some(HeaderField::Type)
            } else if schema.description == index {
                Some(HeaderField::Description)
            } else if schema.amount == index {
                Some(HeaderField::Amount)
            } else if schema.balance == Some(index) {
                Some(HeaderField::Balance)
            } else {
                None
            };
            let display_name = header_cell(layout, resolved, index)
                .unwrap_or_else(|| format!("Kolumn {}", index + 1));
            ColumnHint {
                index,
                display_name,
                suggested_field,
            }
        })
        .collect();

    ImportPreview {
        separator: layout.separator,
        column_count: layout.column_count,
        layout_confidence: layout.confidence,
        schema_confidence: resolved.confidence,
        schema: resolved.schema.clone(),
        schema_source: resolved.source,
        header_line: resolved.header_line,
        columns,
        rows,
    }
}

fn header_cell(layout: &DetectedLayout, resolved: &ResolvedSchema, index: usize) -> Option<String> {
    let line = resolved.header_line?;
    let row = layout.rows.iter().find(|r| r.line_number == line)?;
    row.cells.get(index).filter(|c| !c.is_empty()).cloned()
}
