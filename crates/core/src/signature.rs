use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::TransactionKind;

/// Confidence at or above which a non-machine-flagged signature still
/// qualifies for automatic categorization.
pub const AUTO_CONFIDENCE_THRESHOLD: f32 = 0.75;

pub const SIGNATURE_ALGORITHM_VERSION: &str = "v1";

/// Who last decided the signature's kind/confidence. Once a human edits a
/// signature it becomes `Manual` and automatic refresh stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SignatureSource {
    #[default]
    Auto,
    Manual,
}

impl SignatureSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureSource::Auto => "Auto",
            SignatureSource::Manual => "Manual",
        }
    }
}

impl std::str::FromStr for SignatureSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SignatureSource::Auto),
            "manual" => Ok(SignatureSource::Manual),
            other => Err(format!("Unknown signature source: '{other}'")),
        }
    }
}

/// A learned (normalized description, kind, amount sign) identity used to
/// recognize recurring transactions across imports. At most one signature
/// exists per identity triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionSignature {
    pub id: Option<i64>,
    pub normalized_description: String,
    pub kind: TransactionKind,
    pub is_positive: bool,
    pub is_machine_generated: bool,
    pub machine_confidence: f32,
    pub merchant_candidate: Option<String>,
    pub note: Option<String>,
    pub source: SignatureSource,
    pub seen_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub algorithm_version: String,
}

impl DescriptionSignature {
    /// Build a brand-new auto-sourced signature from its first sighting.
    pub fn first_sighting(
        normalized_description: String,
        kind: TransactionKind,
        is_positive: bool,
        raw_description: &str,
        heuristics: &SignatureHeuristics,
        now: DateTime<Utc>,
    ) -> Self {
        let (is_machine_generated, machine_confidence) =
            heuristics.analyze(raw_description);
        let merchant_candidate =
            extract_merchant_candidate(&normalized_description, raw_description);

        DescriptionSignature {
            id: None,
            normalized_description,
            kind,
            is_positive,
            is_machine_generated,
            machine_confidence,
            merchant_candidate,
            note: None,
            source: SignatureSource::Auto,
            seen_count: 1,
            first_seen: now,
            last_seen: now,
            algorithm_version: SIGNATURE_ALGORITHM_VERSION.to_string(),
        }
    }

    /// Record another sighting. Seen-count and last-seen always move; kind,
    /// confidence, merchant and algorithm version are refreshed only while
    /// the signature is still auto-sourced.
    pub fn record_sighting(
        &mut self,
        kind: TransactionKind,
        raw_description: &str,
        heuristics: &SignatureHeuristics,
        now: DateTime<Utc>,
    ) {
        self.seen_count += 1;
        self.last_seen = now;

        if self.source != SignatureSource::Auto {
            return;
        }

        let (is_machine_generated, machine_confidence) =
            heuristics.analyze(raw_description);

        self.kind = kind;
        self.is_machine_generated = is_machine_generated;
        self.machine_confidence = machine_confidence;
        if self.merchant_candidate.is_none() {
            self.merchant_candidate = extract_merchant_candidate(
                &self.normalized_description,
                raw_description,
            );
        }
        self.algorithm_version = SIGNATURE_ALGORITHM_VERSION.to_string();
    }

    /// A machine-flagged signature is trusted outright; others need the
    /// confidence threshold.
    pub fn is_eligible_for_auto_categorization(&self) -> bool {
        self.is_machine_generated || self.machine_confidence >= AUTO_CONFIDENCE_THRESHOLD
    }
}

/// Weights for the machine-generated description heuristics. The verdict
/// checks themselves are fixed (tuned to Swedish bank export conventions);
/// only the weights are configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureHeuristics {
    pub base_confidence: f32,
    pub per_verdict: f32,
    pub no_verdict_confidence: f32,
}

impl Default for SignatureHeuristics {
    fn default() -> Self {
        SignatureHeuristics {
            base_confidence: 0.45,
            per_verdict: 0.2,
            no_verdict_confidence: 0.2,
        }
    }
}

impl SignatureHeuristics {
    /// Returns (is_machine_generated, confidence) for a raw description.
    pub fn analyze(&self, description: &str) -> (bool, f32) {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return (false, 0.0);
        }

        let mut verdicts = 0u32;
        if is_all_caps_with_space(trimmed) {
            verdicts += 1;
        }
        if has_country_code_suffix(trimmed) {
            verdicts += 1;
        }
        if trimmed.contains(" AB") {
            verdicts += 1;
        }

        if verdicts > 0 {
            let confidence =
                (self.base_confidence + verdicts as f32 * self.per_verdict).min(1.0);
            (true, confidence)
        } else {
            (false, self.no_verdict_confidence)
        }
    }
}

fn is_all_caps_with_space(text: &str) -> bool {
    text == text.to_uppercase() && text.contains(' ')
}

/// True when the text ends with `,XX` where both trailing characters are
/// uppercase — the country suffix card terminals append ("...,STOCKHOLM,SE").
fn has_country_code_suffix(text: &str) -> bool {
    let mut rev = text.chars().rev();
    let (last, second, third) = match (rev.next(), rev.next(), rev.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => return false,
    };
    third == ',' && second.is_uppercase() && last.is_uppercase()
}

/// First raw token of at least three characters, falling back to the
/// normalized description.
pub fn extract_merchant_candidate(normalized: &str, raw: &str) -> Option<String> {
    let from_raw = raw
        .split_whitespace()
        .find(|part| part.chars().count() >= 3)
        .map(str::to_string);
    if from_raw.is_some() {
        return from_raw;
    }

    normalized
        .split_whitespace()
        .find(|part| part.chars().count() >= 3)
        .map(str::to_string)
}
