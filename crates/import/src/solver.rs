//! Column-to-role assignment over profiled columns.
//!
//! The per-role score formulas and tie-break order here are load-bearing
//! business rules. The search is explicit nested iteration over small
//! candidate pools rather than a generic optimizer on purpose.

use std::cmp::Ordering;

use crate::profile::ColumnProfile;

/// Aligned sample agreement at or above this rate marks a column redundant.
pub const DUPLICATE_THRESHOLD: f64 = 0.95;

/// Candidates kept per role before the exhaustive search (plus "none").
pub const MAX_CANDIDATES_PER_ROLE: usize = 4;

/// Date-parse rate a column must clear to join deterministic pairing.
pub const DATE_RATE_THRESHOLD: f64 = 0.6;

/// The chosen role assignment with per-role diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    pub booking_date: Option<usize>,
    pub transaction_date: Option<usize>,
    pub transaction_type: Option<usize>,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub balance: Option<usize>,

    pub total_score: f64,
    pub date_score: f64,
    pub type_score: f64,
    pub description_score: f64,
    pub amount_score: f64,
    pub balance_score: f64,

    pub redundant_columns: Vec<usize>,
}

/// Solve the best role assignment for the given profiles.
pub fn solve(profiles: &[ColumnProfile]) -> ColumnMap {
    let redundant = resolve_redundant_columns(profiles);
    let active: Vec<&ColumnProfile> = profiles
        .iter()
        .filter(|p| !redundant.contains(&p.index))
        .collect();

    let mut map = ColumnMap {
        redundant_columns: redundant,
        ..ColumnMap::default()
    };
    if active.is_empty() {
        return map;
    }

    let has_negatives = profiles.iter().any(|p| p.has_negative());

    // Deterministic resolutions first; the exhaustive search covers whatever
    // is left open.
    let fixed_dates = resolve_date_pair(&active);
    let (fixed_amount, fixed_balance) =
        resolve_amount_and_balance(&active, fixed_dates, has_negatives);

    let (booking_pool, transaction_pool) = match fixed_dates {
        Some((booking, transaction)) => (
            vec![Some(lookup(&active, booking))],
            vec![Some(lookup(&active, transaction))],
        ),
        None => {
            let pool = candidate_pool(&active, |p| p.date_rate);
            (pool.clone(), pool)
        }
    };
    let type_pool = candidate_pool(&active, type_score);
    let description_pool = candidate_pool(&active, description_score);

    let mut best_total = f64::MIN;

    for &booking in &booking_pool {
        for &transaction in &transaction_pool {
            if booking.is_none() && transaction.is_none() && fixed_dates.is_none() {
                continue;
            }
            let date_score = compute_date_score(booking, transaction);

            let mut used_by_dates: Vec<usize> = Vec::new();
            if let Some(b) = booking {
                used_by_dates.push(b.index);
            }
            if let Some(t) = transaction {
                if Some(t.index) != booking.map(|b| b.index) {
                    used_by_dates.push(t.index);
                }
            }

            for &type_candidate in &type_pool {
                if let Some(t) = type_candidate {
                    if used_by_dates.contains(&t.index) {
                        continue;
                    }
                }
                let type_score_value = type_candidate.map(type_score).unwrap_or(0.0);

                for &description_candidate in &description_pool {
                    if let Some(d) = description_candidate {
                        if used_by_dates.contains(&d.index)
                            || type_candidate.map(|t| t.index) == Some(d.index)
                        {
                            continue;
                        }
                    }
                    let description_score_value = description_candidate
                        .map(description_score)
                        .unwrap_or(0.0);

                    let mut used = used_by_dates.clone();
                    used.extend(type_candidate.map(|t| t.index));
                    used.extend(description_candidate.map(|d| d.index));

                    let amount = fixed_amount.filter(|i| !used.contains(i));
                    let amount_score_value = amount
                        .and_then(|i| active.iter().find(|p| p.index == i).copied())
                        .map(|p| amount_score(p, has_negatives))
                        .unwrap_or(0.0);
                    used.extend(amount);

                    let balance = fixed_balance.filter(|i| !used.contains(i));
                    let balance_score_value = balance
                        .and_then(|i| active.iter().find(|p| p.index == i).copied())
                        .map(balance_score)
                        .unwrap_or(0.0);

                    let total = date_score
                        + type_score_value
                        + description_score_value
                        + amount_score_value
                        + balance_score_value;
                    if total <= best_total {
                        continue;
                    }
                    best_total = total;

                    map.booking_date = booking.map(|p| p.index);
                    map.transaction_date = transaction.map(|p| p.index);
                    map.transaction_type = type_candidate.map(|p| p.index);
                    map.description = description_candidate.map(|p| p.index);
                    map.amount = amount;
                    map.balance = balance;
                    map.total_score = total;
                    map.date_score = date_score;
                    map.type_score = type_score_value;
                    map.description_score = description_score_value;
                    map.amount_score = amount_score_value;
                    map.balance_score = balance_score_value;
                }
            }
        }
    }

    map
}

fn lookup<'a>(active: &[&'a ColumnProfile], index: usize) -> &'a ColumnProfile {
    active
        .iter()
        .find(|p| p.index == index)
        .copied()
        .unwrap_or(active[0])
}

// ── redundancy ──────────────────────────────────────────────────────────────

/// Later-indexed member of any near-identical column pair.
fn resolve_redundant_columns(profiles: &[ColumnProfile]) -> Vec<usize> {
    let mut redundant: Vec<usize> = Vec::new();
    for (i, left) in profiles.iter().enumerate() {
        if redundant.contains(&left.index) {
            continue;
        }
        for right in &profiles[i + 1..] {
            if redundant.contains(&right.index) {
                continue;
            }
            if duplicate_rate(left, right) >= DUPLICATE_THRESHOLD {
                redundant.push(right.index);
            }
        }
    }
    redundant.sort_unstable();
    redundant
}

/// Case-insensitive agreement over aligned non-blank sample pairs.
fn duplicate_rate(left: &ColumnProfile, right: &ColumnProfile) -> f64 {
    let mut matches = 0usize;
    let mut comparisons = 0usize;
    for (l, r) in left.values.iter().zip(&right.values) {
        if l.is_empty() && r.is_empty() {
            continue;
        }
        comparisons += 1;
        if l.to_lowercase() == r.to_lowercase() {
            matches += 1;
        }
    }
    if comparisons == 0 {
        0.0
    } else {
        matches as f64 / comparisons as f64
    }
}

// ── deterministic resolutions ───────────────────────────────────────────────

/// When two or more columns clear the date-rate threshold, pick the
/// (booking, transaction) ordering maximizing row pairs where booking is on
/// or after transaction. Identical columns collapse to one index for both.
fn resolve_date_pair(active: &[&ColumnProfile]) -> Option<(usize, usize)> {
    let strong: Vec<&ColumnProfile> = active
        .iter()
        .copied()
        .filter(|p| p.date_rate >= DATE_RATE_THRESHOLD)
        .collect();
    if strong.len() < 2 {
        return None;
    }

    let mut best: Option<(usize, usize, f64)> = None;
    for &booking in &strong {
        for &transaction in &strong {
            if booking.index == transaction.index {
                continue;
            }
            let ratio = ordering_ratio(booking, transaction);
            let better = match best {
                None => true,
                Some((_, _, best_ratio)) => ratio > best_ratio,
            };
            if better {
                best = Some((booking.index, transaction.index, ratio));
            }
        }
    }

    let (booking, transaction, _) = best?;
    if lookup(active, booking).values == lookup(active, transaction).values {
        let single = booking.min(transaction);
        return Some((single, single));
    }
    Some((booking, transaction))
}

/// Fraction of jointly-parsed row pairs where booking >= transaction.
fn ordering_ratio(booking: &ColumnProfile, transaction: &ColumnProfile) -> f64 {
    let mut pairs = 0usize;
    let mut satisfying = 0usize;
    for (b, t) in booking.date_samples.iter().zip(&transaction.date_samples) {
        let (Some(b), Some(t)) = (b, t) else { continue };
        pairs += 1;
        if b >= t {
            satisfying += 1;
        }
    }
    if pairs == 0 {
        1.0
    } else {
        satisfying as f64 / pairs as f64
    }
}

/// Pick amount and balance among numeric candidates. With negatives present
/// the sign-mixed column is the amount and the most-positive remaining column
/// the balance; all-positive inputs split on median size instead.
fn resolve_amount_and_balance(
    active: &[&ColumnProfile],
    fixed_dates: Option<(usize, usize)>,
    has_negatives: bool,
) -> (Option<usize>, Option<usize>) {
    let claimed: Vec<usize> = match fixed_dates {
        Some((b, t)) => vec![b, t],
        None => Vec::new(),
    };
    let mut pool: Vec<&ColumnProfile> = active
        .iter()
        .copied()
        .filter(|p| p.amount_rate > 0.0 && !claimed.contains(&p.index))
        .collect();
    pool.sort_by(|a, b| {
        amount_score(b, has_negatives)
            .partial_cmp(&amount_score(a, has_negatives))
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    pool.truncate(MAX_CANDIDATES_PER_ROLE);

    if pool.is_empty() {
        return (None, None);
    }

    let amount = if has_negatives {
        pool.iter()
            .max_by(|a, b| {
                a.sign_mix_rate
                    .partial_cmp(&b.sign_mix_rate)
                    .unwrap_or(Ordering::Equal)
                    .then(b.index.cmp(&a.index))
            })
            .map(|p| p.index)
    } else {
        pool.iter()
            .min_by(|a, b| a.median.cmp(&b.median).then(a.index.cmp(&b.index)))
            .map(|p| p.index)
    };

    let balance = amount.and_then(|amount_index| {
        let rest: Vec<&ColumnProfile> = pool
            .iter()
            .copied()
            .filter(|p| p.index != amount_index)
            .collect();
        if has_negatives {
            rest.iter()
                .max_by(|a, b| {
                    a.mostly_positive_rate
                        .partial_cmp(&b.mostly_positive_rate)
                        .unwrap_or(Ordering::Equal)
                        .then(b.index.cmp(&a.index))
                })
                .map(|p| p.index)
        } else {
            rest.iter()
                .max_by(|a, b| a.median.cmp(&b.median).then(b.index.cmp(&a.index)))
                .map(|p| p.index)
        }
    });

    (amount, balance)
}

// ── per-role scoring ────────────────────────────────────────────────────────

fn type_score(profile: &ColumnProfile) -> f64 {
    let normalized_length = (1.0 - (profile.avg_length / 30.0).min(1.0)).max(0.0);
    let uniqueness = 1.0 - profile.unique_rate.min(1.0);
    profile.type_keyword_rate * 0.7 + uniqueness * 0.2 + normalized_length * 0.1
}

fn description_score(profile: &ColumnProfile) -> f64 {
    let length_boost = (profile.avg_length / 40.0).min(1.0);
    profile.signature_match_rate * 0.4
        + profile.card_purchase_rate * 0.3
        + length_boost * 0.2
        + profile.unique_rate * 0.1
}

fn amount_score(profile: &ColumnProfile, has_negatives: bool) -> f64 {
    let median_score = 1.0 - (median_abs_f64(profile) / 10_000.0).min(1.0);
    if has_negatives {
        profile.amount_rate * 0.5 + profile.sign_mix_rate * 0.4 + median_score * 0.1
    } else {
        profile.amount_rate * 0.6 + median_score * 0.4
    }
}

fn balance_score(profile: &ColumnProfile) -> f64 {
    profile.amount_rate * 0.5 + (median_abs_f64(profile) / 10_000.0).min(1.0) * 0.2
}

fn median_abs_f64(profile: &ColumnProfile) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    profile.median.abs().to_f64().unwrap_or(f64::MAX)
}

/// Paired date score: average parse confidence weighted with the fraction of
/// rows where booking is on or after transaction.
fn compute_date_score(booking: Option<&ColumnProfile>, transaction: Option<&ColumnProfile>) -> f64 {
    let (booking, transaction) = match (booking, transaction) {
        (None, None) => return 0.0,
        (Some(b), Some(t)) => (b, t),
        (Some(b), None) => (b, b),
        (None, Some(t)) => (t, t),
    };
    let confidence = (booking.date_rate + transaction.date_rate) / 2.0;
    if booking.date_samples.is_empty() || transaction.date_samples.is_empty() {
        return confidence * 0.6;
    }
    confidence * 0.6 + ordering_ratio(booking, transaction) * 0.4
}

/// Top candidates for a role, best first, with a trailing "no column" slot.
fn candidate_pool<'a>(
    active: &[&'a ColumnProfile],
    score: impl Fn(&ColumnProfile) -> f64,
) -> Vec<Option<&'a ColumnProfile>> {
    let mut sorted: Vec<&'a ColumnProfile> = active.to_vec();
    sorted.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    let mut pool: Vec<Option<&'a ColumnProfile>> = sorted
        .into_iter()
        .take(MAX_CANDIDATES_PER_ROLE)
        .map(Some)
        .collect();
    pool.push(None);
    pool
}
