//! Per-column statistical profiling over a bounded sample of data rows.
//!
//! The profiler is pure: it never touches storage. Known-signature lookups go
//! through the [`SignatureIndex`] trait, so the caller decides whether the
//! index is backed by a database or a test fixture.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::card::is_card_purchase;
use crate::config::ImportConfig;
use crate::layout::{RawRow, RowClass};
use crate::value::{parse_amount, parse_date};
use kassabok_core::{normalize_matching, normalize_text};

/// Data rows sampled per column when profiling.
pub const PROFILE_SAMPLE_ROWS: usize = 50;

/// Read-only lookup of already-known description signatures.
pub trait SignatureIndex {
    /// Which of the given normalized descriptions are already known.
    fn matching_descriptions(&self, candidates: &[String]) -> HashSet<String>;
}

/// A signature index that knows nothing. Used when previewing without storage.
pub struct EmptySignatureIndex;

impl SignatureIndex for EmptySignatureIndex {
    fn matching_descriptions(&self, _candidates: &[String]) -> HashSet<String> {
        HashSet::new()
    }
}

/// Statistics gathered for one physical column. All rates are over the full
/// sample count, blanks included.
#[derive(Debug, Clone, Default)]
pub struct ColumnProfile {
    pub index: usize,
    /// Header cell for this column when a header row exists.
    pub header: Option<String>,
    pub sampled: usize,

    pub date_rate: f64,
    pub amount_rate: f64,
    /// Distinct normalized non-blank values / samples.
    pub unique_rate: f64,
    pub avg_length: f64,
    pub max_length: usize,
    pub type_keyword_rate: f64,
    pub signature_match_rate: f64,
    pub card_purchase_rate: f64,

    pub positive_count: usize,
    pub negative_count: usize,
    /// min(pos, neg) / (pos + neg); 0 when nothing parsed.
    pub sign_mix_rate: f64,
    /// pos / (pos + neg); 0 when nothing parsed.
    pub mostly_positive_rate: f64,
    pub median: Decimal,
    pub median_abs: Decimal,

    /// Cleaned values in row order, for redundancy comparison.
    pub values: Vec<String>,
    /// Per-row parse results aligned with `values`, for date-pair checks.
    pub date_samples: Vec<Option<NaiveDate>>,
    /// Per-row parse results aligned with `values`.
    pub amount_samples: Vec<Option<Decimal>>,
}

impl ColumnProfile {
    pub fn has_negative(&self) -> bool {
        self.negative_count > 0
    }
}

/// Profile every column over at most [`PROFILE_SAMPLE_ROWS`] data rows.
///
/// Rows are only profiled when their cell count matches `column_count`;
/// ragged rows are the parser's problem, not the profiler's.
pub fn profile_columns(
    rows: &[RawRow],
    column_count: usize,
    config: &ImportConfig,
    signatures: &dyn SignatureIndex,
) -> Vec<ColumnProfile> {
    let header_row = rows.iter().find(|r| r.class == RowClass::Header);
    let sample: Vec<&RawRow> = rows
        .iter()
        .filter(|r| r.class == RowClass::DataCandidate && r.cells.len() == column_count)
        .take(PROFILE_SAMPLE_ROWS)
        .collect();

    let type_keywords: Vec<String> = config
        .type_keywords()
        .iter()
        .map(|k| k.to_string())
        .collect();

    (0..column_count)
        .map(|index| {
            profile_one(
                index,
                &sample,
                header_row,
                config,
                &type_keywords,
                signatures,
            )
        })
        .collect()
}

fn profile_one(
    index: usize,
    sample: &[&RawRow],
    header_row: Option<&RawRow>,
    config: &ImportConfig,
    type_keywords: &[String],
    signatures: &dyn SignatureIndex,
) -> ColumnProfile {
    let values: Vec<String> = sample.iter().map(|row| row.cells[index].clone()).collect();
    let normalized: Vec<String> = values.iter().map(|v| normalize_text(v)).collect();

    let mut profile = ColumnProfile {
        index,
        header: header_row.and_then(|row| row.cells.get(index).cloned()),
        sampled: values.len(),
        ..ColumnProfile::default()
    };
    let denominator = values.len().max(1) as f64;

    let mut date_samples: Vec<Option<NaiveDate>> = Vec::with_capacity(values.len());
    let mut amount_samples: Vec<Option<Decimal>> = Vec::with_capacity(values.len());
    let mut amounts: Vec<Decimal> = Vec::new();
    let mut date_matches = 0usize;
    let mut total_length = 0usize;
    let mut keyword_hits = 0usize;
    let mut card_hits = 0usize;

    for value in &values {
        let length = value.chars().count();
        total_length += length;
        profile.max_length = profile.max_length.max(length);

        let date = parse_date(value, &config.date_formats);
        if date.is_some() {
            date_matches += 1;
        }
        date_samples.push(date);

        let amount = parse_amount(value);
        amount_samples.push(amount);
        if let Some(amount) = amount {
            amounts.push(amount);
            if amount > Decimal::ZERO {
                profile.positive_count += 1;
            }
            if amount < Decimal::ZERO {
                profile.negative_count += 1;
            }
        }

        if !value.is_empty() {
            let matched = normalize_matching(value);
            if type_keywords.iter().any(|k| matched.contains(k)) {
                keyword_hits += 1;
            }
            if is_card_purchase(value) {
                card_hits += 1;
            }
        }
    }

    let distinct: HashSet<&str> = normalized
        .iter()
        .filter(|v| !v.is_empty())
        .map(String::as_str)
        .collect();

    let known = signatures.matching_descriptions(&normalized);
    let signature_hits = normalized
        .iter()
        .filter(|v| !v.is_empty() && known.contains(*v))
        .count();

    profile.date_rate = date_matches as f64 / denominator;
    profile.amount_rate = amounts.len() as f64 / denominator;
    profile.unique_rate = distinct.len() as f64 / denominator;
    profile.avg_length = if values.is_empty() {
        0.0
    } else {
        total_length as f64 / values.len() as f64
    };
    profile.type_keyword_rate = keyword_hits as f64 / denominator;
    profile.signature_match_rate = signature_hits as f64 / denominator;
    profile.card_purchase_rate = card_hits as f64 / denominator;

    let parsed = profile.positive_count + profile.negative_count;
    if parsed > 0 {
        profile.sign_mix_rate =
            profile.positive_count.min(profile.negative_count) as f64 / parsed as f64;
        profile.mostly_positive_rate = profile.positive_count as f64 / parsed as f64;
    }
    profile.median = median(&mut amounts.clone());
    let mut abs: Vec<Decimal> = amounts.iter().map(|d| d.abs()).collect();
    profile.median_abs = median(&mut abs);

    profile.values = values;
    profile.date_samples = date_samples;
    profile.amount_samples = amount_samples;
    profile
}

/// Median of parsed amounts; even-length samples average the middle pair.
fn median(values: &mut [Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.sort();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / Decimal::TWO
    }
}
