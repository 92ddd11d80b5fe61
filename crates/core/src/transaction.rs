use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::kind::TransactionKind;

/// A bank-export row normalized into a transaction, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub booking_date: Option<NaiveDate>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub normalized_description: String,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
    pub type_raw: Option<String>,
    pub kind: TransactionKind,
    /// 1-based line number in the pasted input.
    pub source_line: usize,
    pub raw_row: String,
    /// `<fingerprint-hex>:<ordinal>` — unique within and across imports.
    pub import_id: String,
}

impl ParsedTransaction {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(
            self.transaction_date,
            &self.normalized_description,
            self.amount,
        )
    }
}

/// Duplicate-detection identity: (transaction date, normalized description,
/// amount). Two rows with the same fingerprint in different imports are the
/// same event; within one import they are distinguished by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub date: NaiveDate,
    pub normalized_description: String,
    pub amount: Decimal,
}

impl Fingerprint {
    pub fn new(date: NaiveDate, normalized_description: &str, amount: Decimal) -> Self {
        Fingerprint {
            date,
            normalized_description: normalized_description.to_string(),
            amount: amount.normalize(),
        }
    }

    /// Stable hex key for the fingerprint. Hashed rather than concatenated so
    /// arbitrary description text cannot collide with the field separator.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.date.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.normalized_description.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.amount.to_string().as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Import identifier for the nth occurrence of this fingerprint,
    /// counting occurrences already in storage.
    pub fn import_id(&self, ordinal: usize) -> String {
        format!("{}:{}", self.key(), ordinal)
    }
}
