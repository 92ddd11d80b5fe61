//! Separator and column-count detection for pasted exports.
//!
//! The input is raw text with no declared format. Each candidate separator is
//! scored by how many sampled rows split into the modal column count; the
//! winner must produce at least three columns on its modal rows.

use thiserror::Error;

use crate::config::ImportConfig;
use kassabok_core::normalize_header;

/// Rows inspected when picking a separator.
pub const LAYOUT_SAMPLE_ROWS: usize = 200;

/// Minimum columns a separator's modal rows must produce.
const MIN_COLUMNS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Pasted text is empty")]
    EmptyInput,
    #[error("No candidate separator splits the rows into at least {MIN_COLUMNS} columns")]
    NoUsableLayout,
}

/// How a raw line participates in the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    /// Resolves at least two known header aliases.
    Header,
    /// Blank or only separator punctuation; carried through for preview.
    NonData,
    /// Everything else; may still fail the column-count check later.
    DataCandidate,
}

/// One input line split by the detected separator.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based line number in the pasted text.
    pub line_number: usize,
    pub text: String,
    pub cells: Vec<String>,
    pub class: RowClass,
}

/// Result of separator detection over the whole input.
#[derive(Debug, Clone)]
pub struct DetectedLayout {
    pub separator: char,
    pub column_count: usize,
    /// Fraction of data-candidate rows matching the modal column count.
    pub confidence: f64,
    pub rows: Vec<RawRow>,
}

/// Split a line and clean each cell.
fn split_cells(line: &str, separator: char) -> Vec<String> {
    line.split(separator).map(crate::value::clean_cell).collect()
}

fn classify(line: &str, cells: &[String], config: &ImportConfig) -> RowClass {
    if is_non_data(line) {
        return RowClass::NonData;
    }
    let alias_hits = cells
        .iter()
        .filter(|cell| config.header_aliases.contains_key(&normalize_header(cell)))
        .count();
    if alias_hits >= 2 {
        RowClass::Header
    } else {
        RowClass::DataCandidate
    }
}

/// Blank lines and lines of bare punctuation (stray separators, rulers).
fn is_non_data(line: &str) -> bool {
    line.chars().all(|c| !c.is_alphanumeric())
}

/// Pick the separator whose modal column count covers the most sampled rows.
///
/// Ties go to the separator yielding *more* columns. Detection only looks at
/// the first [`LAYOUT_SAMPLE_ROWS`] lines but the returned rows cover the
/// whole input.
pub fn detect_layout(raw: &str, config: &ImportConfig) -> Result<DetectedLayout, LayoutError> {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return Err(LayoutError::EmptyInput);
    }

    let mut best: Option<(char, usize, usize)> = None; // (sep, modal count, rows at modal)

    for &separator in &config.separators {
        let mut counts: Vec<(usize, usize)> = Vec::new(); // (column count, rows)
        for line in lines.iter().take(LAYOUT_SAMPLE_ROWS) {
            let cells = split_cells(line, separator);
            if classify(line, &cells, config) != RowClass::DataCandidate {
                continue;
            }
            match counts.iter_mut().find(|(c, _)| *c == cells.len()) {
                Some((_, n)) => *n += 1,
                None => counts.push((cells.len(), 1)),
            }
        }
        let Some(&(modal_columns, modal_rows)) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        else {
            continue;
        };
        if modal_columns < MIN_COLUMNS {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, best_columns, best_rows)) => {
                modal_rows > best_rows || (modal_rows == best_rows && modal_columns > best_columns)
            }
        };
        if better {
            best = Some((separator, modal_columns, modal_rows));
        }
    }

    let Some((separator, column_count, modal_rows)) = best else {
        return Err(LayoutError::NoUsableLayout);
    };

    let rows: Vec<RawRow> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let cells = split_cells(line, separator);
            let class = classify(line, &cells, config);
            RawRow {
                line_number: i + 1,
                text: line.to_string(),
                cells,
                class,
            }
        })
        .collect();

    let sampled_candidates = rows
        .iter()
        .take(LAYOUT_SAMPLE_ROWS)
        .filter(|r| r.class == RowClass::DataCandidate)
        .count();
    let confidence = if sampled_candidates == 0 {
        0.0
    } else {
        modal_rows as f64 / sampled_candidates as f64
    };

    tracing::debug!(
        separator = %separator.escape_default(),
        column_count,
        confidence,
        rows = rows.len(),
        "layout detected"
    );

    Ok(DetectedLayout {
        separator,
        column_count,
        confidence,
        rows,
    })
}
