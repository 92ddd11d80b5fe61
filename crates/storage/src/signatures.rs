//! Description-signature persistence and lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use crate::db::DbPool;
use crate::StorageError;
use kassabok_core::{DescriptionSignature, SignatureHeuristics, SignatureSource, TransactionKind};
use kassabok_import::SignatureIndex;

/// Identity triple of a signature row.
type Identity = (String, String, bool);

fn identity(normalized_description: &str, kind: TransactionKind, is_positive: bool) -> Identity {
    (
        normalized_description.to_string(),
        kind.as_str().to_string(),
        is_positive,
    )
}

/// Signature lookup/create scoped to one import. New signatures stay
/// in-flight until [`SignatureStore::flush`], so repeated descriptions within
/// a batch hit the same entity instead of racing the unique constraint.
pub struct SignatureStore {
    heuristics: SignatureHeuristics,
    in_flight: HashMap<Identity, DescriptionSignature>,
}

impl SignatureStore {
    pub fn new(heuristics: SignatureHeuristics) -> Self {
        SignatureStore {
            heuristics,
            in_flight: HashMap::new(),
        }
    }

    /// Find or create the signature for one transaction. Sign is taken from
    /// the amount (zero counts as positive). Persisted signatures are updated
    /// in place; new ones are created in-flight.
    pub async fn get_or_create(
        &mut self,
        pool: &DbPool,
        normalized_description: &str,
        kind: TransactionKind,
        amount: Decimal,
        raw_description: &str,
    ) -> Result<DescriptionSignature, StorageError> {
        let is_positive = amount >= Decimal::ZERO;
        let key = identity(normalized_description, kind, is_positive);
        let now = Utc::now();

        if let Some(existing) = self.in_flight.get_mut(&key) {
            existing.record_sighting(kind, raw_description, &self.heuristics, now);
            return Ok(existing.clone());
        }

        if let Some(mut stored) =
            fetch_by_identity(pool, normalized_description, kind, is_positive).await?
        {
            stored.record_sighting(kind, raw_description, &self.heuristics, now);
            update(pool, &stored).await?;
            return Ok(stored);
        }

        let signature = DescriptionSignature::first_sighting(
            normalized_description.to_string(),
            kind,
            is_positive,
            raw_description,
            &self.heuristics,
            now,
        );
        self.in_flight.insert(key, signature.clone());
        Ok(signature)
    }

    /// Persist all in-flight signatures and return their identities mapped to
    /// row ids.
    pub async fn flush(&mut self, pool: &DbPool) -> Result<HashMap<Identity, i64>, StorageError> {
        let mut ids = HashMap::new();
        for (key, signature) in self.in_flight.drain() {
            let id = insert(pool, &signature).await?;
            ids.insert(key, id);
        }
        Ok(ids)
    }
}

/// Load the set of known normalized descriptions for profiling. Batch
/// membership keeps the profiler free of storage calls.
pub struct LoadedSignatureIndex {
    descriptions: HashSet<String>,
}

impl LoadedSignatureIndex {
    pub async fn load(pool: &DbPool) -> Result<Self, StorageError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT normalized_description FROM signatures",
        )
        .fetch_all(pool)
        .await?;
        Ok(LoadedSignatureIndex {
            descriptions: rows.into_iter().map(|r| r.0).collect(),
        })
    }
}

impl SignatureIndex for LoadedSignatureIndex {
    fn matching_descriptions(&self, candidates: &[String]) -> HashSet<String> {
        candidates
            .iter()
            .filter(|c| self.descriptions.contains(*c))
            .cloned()
            .collect()
    }
}

pub async fn fetch_by_identity(
    pool: &DbPool,
    normalized_description: &str,
    kind: TransactionKind,
    is_positive: bool,
) -> Result<Option<DescriptionSignature>, StorageError> {
    let row = sqlx::query_as::<_, SignatureRow>(
        "SELECT id, normalized_description, kind, is_positive, is_machine_generated, \
         machine_confidence, merchant_candidate, note, source, seen_count, first_seen, \
         last_seen, algorithm_version \
         FROM signatures WHERE normalized_description = ? AND kind = ? AND is_positive = ?",
    )
    .bind(normalized_description)
    .bind(kind.as_str())
    .bind(is_positive)
    .fetch_optional(pool)
    .await?;
    row.map(SignatureRow::into_signature).transpose()
}

pub async fn fetch_by_id(
    pool: &DbPool,
    id: i64,
) -> Result<Option<DescriptionSignature>, StorageError> {
    let row = sqlx::query_as::<_, SignatureRow>(
        "SELECT id, normalized_description, kind, is_positive, is_machine_generated, \
         machine_confidence, merchant_candidate, note, source, seen_count, first_seen, \
         last_seen, algorithm_version \
         FROM signatures WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(SignatureRow::into_signature).transpose()
}

/// Signature category, used by auto-categorization.
pub async fn category_of(pool: &DbPool, signature_id: i64) -> Result<Option<i64>, StorageError> {
    let row = sqlx::query_as::<_, (Option<i64>,)>(
        "SELECT category_id FROM signatures WHERE id = ?",
    )
    .bind(signature_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|r| r.0))
}

/// A human edit: set kind/category/note/merchant and flip provenance to
/// Manual, freezing automatic refresh.
pub async fn apply_manual_edit(
    pool: &DbPool,
    signature_id: i64,
    category_id: Option<i64>,
    note: Option<&str>,
    merchant_candidate: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE signatures SET source = 'Manual', \
         category_id = COALESCE(?, category_id), \
         note = COALESCE(?, note), \
         merchant_candidate = COALESCE(?, merchant_candidate), \
         last_seen = ? \
         WHERE id = ?",
    )
    .bind(category_id)
    .bind(note)
    .bind(merchant_candidate)
    .bind(Utc::now().to_rfc3339())
    .bind(signature_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert(pool: &DbPool, signature: &DescriptionSignature) -> Result<i64, StorageError> {
    let result = sqlx::query(
        "INSERT INTO signatures (normalized_description, kind, is_positive, \
         is_machine_generated, machine_confidence, merchant_candidate, note, source, \
         seen_count, first_seen, last_seen, algorithm_version) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&signature.normalized_description)
    .bind(signature.kind.as_str())
    .bind(signature.is_positive)
    .bind(signature.is_machine_generated)
    .bind(signature.machine_confidence)
    .bind(&signature.merchant_candidate)
    .bind(&signature.note)
    .bind(signature.source.as_str())
    .bind(signature.seen_count)
    .bind(signature.first_seen.to_rfc3339())
    .bind(signature.last_seen.to_rfc3339())
    .bind(&signature.algorithm_version)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn update(pool: &DbPool, signature: &DescriptionSignature) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE signatures SET kind = ?, is_machine_generated = ?, machine_confidence = ?, \
         merchant_candidate = ?, seen_count = ?, last_seen = ?, algorithm_version = ? \
         WHERE id = ?",
    )
    .bind(signature.kind.as_str())
    .bind(signature.is_machine_generated)
    .bind(signature.machine_confidence)
    .bind(&signature.merchant_candidate)
    .bind(signature.seen_count)
    .bind(signature.last_seen.to_rfc3339())
    .bind(&signature.algorithm_version)
    .bind(signature.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete auto-sourced, note-less signatures with no linked transactions.
/// Returns the number deleted.
pub async fn cleanup_orphans(pool: &DbPool) -> Result<u64, StorageError> {
    let result = sqlx::query(
        "DELETE FROM signatures WHERE source = 'Auto' \
         AND (note IS NULL OR note = '') \
         AND id NOT IN (SELECT signature_id FROM transactions WHERE signature_id IS NOT NULL)",
    )
    .execute(pool)
    .await?;
    let deleted = result.rows_affected();
    if deleted > 0 {
        tracing::info!(deleted, "removed orphaned auto signatures");
    }
    Ok(deleted)
}

#[derive(sqlx::FromRow)]
struct SignatureRow {
    id: i64,
    normalized_description: String,
    kind: String,
    is_positive: bool,
    is_machine_generated: bool,
    machine_confidence: f32,
    merchant_candidate: Option<String>,
    note: Option<String>,
    source: String,
    seen_count: i64,
    first_seen: String,
    last_seen: String,
    algorithm_version: String,
}

impl SignatureRow {
    fn into_signature(self) -> Result<DescriptionSignature, StorageError> {
        let kind: TransactionKind = self
            .kind
            .parse()
            .map_err(|e: String| StorageError::Corrupt(e))?;
        let source: SignatureSource = self
            .source
            .parse()
            .map_err(|e: String| StorageError::Corrupt(e))?;
        Ok(DescriptionSignature {
            id: Some(self.id),
            normalized_description: self.normalized_description,
            kind,
            is_positive: self.is_positive,
            is_machine_generated: self.is_machine_generated,
            machine_confidence: self.machine_confidence,
            merchant_candidate: self.merchant_candidate,
            note: self.note,
            source,
            seen_count: self.seen_count,
            first_seen: parse_timestamp(&self.first_seen)?,
            last_seen: parse_timestamp(&self.last_seen)?,
            algorithm_version: self.algorithm_version,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_db;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_roundtrips_through_flush() {
        let pool = create_memory_db().await.unwrap();
        let mut store = SignatureStore::new(SignatureHeuristics::default());

        let first = store
            .get_or_create(
                &pool,
                "ica supermarket ab",
                TransactionKind::CardPurchase,
                dec("-123.45"),
                "ICA SUPERMARKET AB",
            )
            .await
            .unwrap();
        assert_eq!(first.seen_count, 1);
        assert!(first.is_machine_generated);

        // Same identity within the batch hits the in-flight entity.
        let second = store
            .get_or_create(
                &pool,
                "ica supermarket ab",
                TransactionKind::CardPurchase,
                dec("-67.89"),
                "ICA SUPERMARKET AB",
            )
            .await
            .unwrap();
        assert_eq!(second.seen_count, 2);

        let ids = store.flush(&pool).await.unwrap();
        assert_eq!(ids.len(), 1);

        // A later import finds the persisted row and bumps it.
        let mut next_store = SignatureStore::new(SignatureHeuristics::default());
        let third = next_store
            .get_or_create(
                &pool,
                "ica supermarket ab",
                TransactionKind::CardPurchase,
                dec("-10.00"),
                "ICA SUPERMARKET AB",
            )
            .await
            .unwrap();
        assert_eq!(third.seen_count, 3);
        assert!(third.id.is_some());
    }

    #[tokio::test]
    async fn sign_splits_identities() {
        let pool = create_memory_db().await.unwrap();
        let mut store = SignatureStore::new(SignatureHeuristics::default());
        store
            .get_or_create(&pool, "swish anna", TransactionKind::Swish, dec("50"), "Swish ANNA")
            .await
            .unwrap();
        store
            .get_or_create(&pool, "swish anna", TransactionKind::Swish, dec("-50"), "Swish ANNA")
            .await
            .unwrap();
        let ids = store.flush(&pool).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn manual_edit_freezes_automatic_refresh() {
        let pool = create_memory_db().await.unwrap();
        let mut store = SignatureStore::new(SignatureHeuristics::default());
        store
            .get_or_create(
                &pool,
                "netflix com",
                TransactionKind::CardPurchase,
                dec("-119"),
                "NETFLIX.COM",
            )
            .await
            .unwrap();
        store.flush(&pool).await.unwrap();

        let stored = fetch_by_identity(&pool, "netflix com", TransactionKind::CardPurchase, false)
            .await
            .unwrap()
            .unwrap();
        let id = stored.id.unwrap();
        apply_manual_edit(&pool, id, None, Some("streaming"), None)
            .await
            .unwrap();

        // A new sighting still bumps seen-count but leaves kind alone.
        let mut next_store = SignatureStore::new(SignatureHeuristics::default());
        next_store
            .get_or_create(
                &pool,
                "netflix com",
                TransactionKind::CardPurchase,
                dec("-119"),
                "netflix",
            )
            .await
            .unwrap();

        let after = fetch_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(after.source, SignatureSource::Manual);
        assert_eq!(after.seen_count, 2);
        assert_eq!(after.note.as_deref(), Some("streaming"));
    }

    #[tokio::test]
    async fn cleanup_removes_only_unlinked_auto_signatures() {
        let pool = create_memory_db().await.unwrap();
        let mut store = SignatureStore::new(SignatureHeuristics::default());
        store
            .get_or_create(&pool, "orphan ab", TransactionKind::Unknown, dec("-1"), "ORPHAN AB")
            .await
            .unwrap();
        store
            .get_or_create(&pool, "kept ab", TransactionKind::Unknown, dec("-1"), "KEPT AB")
            .await
            .unwrap();
        let ids = store.flush(&pool).await.unwrap();
        let kept_id = ids[&("kept ab".to_string(), "Unknown".to_string(), false)];

        sqlx::query(
            "INSERT INTO transactions (import_id, fingerprint, transaction_date, description, \
             normalized_description, amount, kind, signature_id) \
             VALUES ('x:0', 'x', '2024-01-02', 'KEPT AB', 'kept ab', '-1', 'Unknown', ?)",
        )
        .bind(kept_id)
        .execute(&pool)
        .await
        .unwrap();

        let deleted = cleanup_orphans(&pool).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(fetch_by_id(&pool, kept_id).await.unwrap().is_some());
    }
}
