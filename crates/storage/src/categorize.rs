//! Batch categorization. Every batch is same-sign validated before any
//! mutation; after that, items are processed independently and failures are
//! collected per item instead of aborting the batch.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::DbPool;
use crate::signatures;
use crate::transactions::{fetch_many, set_category, StoredTransaction};
use crate::StorageError;

#[derive(Debug, Error)]
pub enum CategorizeError {
    #[error("Batch mixes positive and negative amounts; no changes applied")]
    MixedSigns,
    #[error("Transaction {0} not found")]
    NotFound(i64),
    #[error("Category {0} not found")]
    UnknownCategory(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome counts for one batch, with per-item failures.
#[derive(Debug, Default)]
pub struct CategorizeOutcome {
    pub categorized: usize,
    pub skipped: usize,
    pub errors: Vec<(i64, String)>,
}

/// All requested transactions must carry the same amount sign (zero counts
/// as positive). Mixed batches are rejected wholesale before any mutation.
pub async fn validate_same_sign(
    pool: &DbPool,
    transaction_ids: &[i64],
) -> Result<Vec<StoredTransaction>, CategorizeError> {
    let transactions = fetch_many(pool, transaction_ids).await?;
    for id in transaction_ids {
        if !transactions.iter().any(|t| t.id == *id) {
            return Err(CategorizeError::NotFound(*id));
        }
    }

    let mut positive = false;
    let mut negative = false;
    for transaction in &transactions {
        if transaction.amount >= Decimal::ZERO {
            positive = true;
        } else {
            negative = true;
        }
    }
    if positive && negative {
        return Err(CategorizeError::MixedSigns);
    }
    Ok(transactions)
}

/// Categorize transactions from their signatures: a transaction gets its
/// signature's category when the signature is eligible and has one.
pub async fn auto_categorize(
    pool: &DbPool,
    transaction_ids: &[i64],
) -> Result<CategorizeOutcome, CategorizeError> {
    let transactions = validate_same_sign(pool, transaction_ids).await?;
    let mut outcome = CategorizeOutcome::default();

    for transaction in &transactions {
        if transaction.category_id.is_some() {
            outcome.skipped += 1;
            continue;
        }
        let Some(signature_id) = transaction.signature_id else {
            outcome.skipped += 1;
            continue;
        };
        let result = auto_categorize_one(pool, transaction.id, signature_id).await;
        match result {
            Ok(true) => outcome.categorized += 1,
            Ok(false) => outcome.skipped += 1,
            Err(e) => outcome.errors.push((transaction.id, e.to_string())),
        }
    }

    tracing::debug!(
        categorized = outcome.categorized,
        skipped = outcome.skipped,
        failed = outcome.errors.len(),
        "auto-categorization finished"
    );
    Ok(outcome)
}

async fn auto_categorize_one(
    pool: &DbPool,
    transaction_id: i64,
    signature_id: i64,
) -> Result<bool, StorageError> {
    let Some(signature) = signatures::fetch_by_id(pool, signature_id).await? else {
        return Ok(false);
    };
    if !signature.is_eligible_for_auto_categorization() {
        return Ok(false);
    }
    let Some(category_id) = signatures::category_of(pool, signature_id).await? else {
        return Ok(false);
    };
    set_category(pool, transaction_id, Some(category_id)).await?;
    Ok(true)
}

/// A human categorizes a batch: each transaction gets the category, and each
/// linked signature learns it and flips to manual provenance.
pub async fn manual_categorize(
    pool: &DbPool,
    transaction_ids: &[i64],
    category_id: i64,
) -> Result<CategorizeOutcome, CategorizeError> {
    let transactions = validate_same_sign(pool, transaction_ids).await?;
    ensure_category_exists(pool, category_id).await?;

    let mut outcome = CategorizeOutcome::default();
    for transaction in &transactions {
        let result = apply_manual(pool, transaction, category_id).await;
        match result {
            Ok(()) => outcome.categorized += 1,
            Err(e) => outcome.errors.push((transaction.id, e.to_string())),
        }
    }
    Ok(outcome)
}

async fn apply_manual(
    pool: &DbPool,
    transaction: &StoredTransaction,
    category_id: i64,
) -> Result<(), StorageError> {
    set_category(pool, transaction.id, Some(category_id)).await?;
    if let Some(signature_id) = transaction.signature_id {
        signatures::apply_manual_edit(pool, signature_id, Some(category_id), None, None).await?;
    }
    Ok(())
}

/// Move already-categorized transactions to another category. Signatures are
/// left untouched.
pub async fn change_category(
    pool: &DbPool,
    transaction_ids: &[i64],
    category_id: i64,
) -> Result<CategorizeOutcome, CategorizeError> {
    let transactions = validate_same_sign(pool, transaction_ids).await?;
    ensure_category_exists(pool, category_id).await?;

    let mut outcome = CategorizeOutcome::default();
    for transaction in &transactions {
        match set_category(pool, transaction.id, Some(category_id)).await {
            Ok(()) => outcome.categorized += 1,
            Err(e) => outcome.errors.push((transaction.id, e.to_string())),
        }
    }
    Ok(outcome)
}

async fn ensure_category_exists(pool: &DbPool, category_id: i64) -> Result<(), CategorizeError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::from)?;
    match row {
        Some(_) => Ok(()),
        None => Err(CategorizeError::UnknownCategory(category_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{category_id_by_key, create_memory_db};
    use crate::transactions::{commit_import, fetch_by_id};
    use chrono::NaiveDate;
    use kassabok_core::{normalize_text, ParsedTransaction, SignatureHeuristics, TransactionKind};
    use std::str::FromStr;

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

    async fn seeded(pool: &DbPool, rows: Vec<ParsedTransaction>) -> Vec<i64> {
        commit_import(pool, rows, SignatureHeuristics::default())
            .await
            .unwrap()
            .inserted_ids
    }

    #[tokio::test]
    async fn mixed_sign_batch_is_rejected_before_any_change() {
        let pool = create_memory_db().await.unwrap();
        let ids = seeded(
            &pool,
            vec![
                tx("2024-01-02", "LÖN", "100.00"),
                tx("2024-01-03", "ICA", "-50.00"),
            ],
        )
        .await;
        let groceries = category_id_by_key(&pool, "groceries").await.unwrap().unwrap();

        let result = manual_categorize(&pool, &ids, groceries).await;
        assert!(matches!(result, Err(CategorizeError::MixedSigns)));

        for id in ids {
            let stored = fetch_by_id(&pool, id).await.unwrap().unwrap();
            assert_eq!(stored.category_id, None);
        }
    }

    #[tokio::test]
    async fn manual_categorize_teaches_the_signature() {
        let pool = create_memory_db().await.unwrap();
        let ids = seeded(&pool, vec![tx("2024-01-02", "ICA SUPERMARKET AB", "-123.45")]).await;
        let groceries = category_id_by_key(&pool, "groceries").await.unwrap().unwrap();

        let outcome = manual_categorize(&pool, &ids, groceries).await.unwrap();
        assert_eq!(outcome.categorized, 1);
        assert!(outcome.errors.is_empty());

        let stored = fetch_by_id(&pool, ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.category_id, Some(groceries));
        let signature = signatures::fetch_by_id(&pool, stored.signature_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signature.source, kassabok_core::SignatureSource::Manual);
    }

    #[tokio::test]
    async fn auto_categorize_follows_eligible_signatures() {
        let pool = create_memory_db().await.unwrap();
        // First purchase, manually categorized: teaches the signature.
        let first = seeded(&pool, vec![tx("2024-01-02", "ICA SUPERMARKET AB", "-123.45")]).await;
        let groceries = category_id_by_key(&pool, "groceries").await.unwrap().unwrap();
        manual_categorize(&pool, &first, groceries).await.unwrap();

        // Second import of the same merchant on another day.
        let second = seeded(&pool, vec![tx("2024-02-02", "ICA SUPERMARKET AB", "-89.00")]).await;
        let outcome = auto_categorize(&pool, &second).await.unwrap();
        assert_eq!(outcome.categorized, 1);

        let stored = fetch_by_id(&pool, second[0]).await.unwrap().unwrap();
        assert_eq!(stored.category_id, Some(groceries));
    }

    #[tokio::test]
    async fn auto_categorize_skips_untaught_signatures() {
        let pool = create_memory_db().await.unwrap();
        let ids = seeded(&pool, vec![tx("2024-01-02", "ICA SUPERMARKET AB", "-10.00")]).await;
        let outcome = auto_categorize(&pool, &ids).await.unwrap();
        assert_eq!(outcome.categorized, 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn change_category_moves_transactions_without_reteaching() {
        let pool = create_memory_db().await.unwrap();
        let ids = seeded(&pool, vec![tx("2024-01-02", "ICA SUPERMARKET AB", "-123.45")]).await;
        let groceries = category_id_by_key(&pool, "groceries").await.unwrap().unwrap();
        let restaurants = category_id_by_key(&pool, "restaurants").await.unwrap().unwrap();
        manual_categorize(&pool, &ids, groceries).await.unwrap();

        let outcome = change_category(&pool, &ids, restaurants).await.unwrap();
        assert_eq!(outcome.categorized, 1);

        let stored = fetch_by_id(&pool, ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.category_id, Some(restaurants));
        // The signature keeps the originally taught category.
        let signature_category = signatures::category_of(&pool, stored.signature_id.unwrap())
            .await
            .unwrap();
        assert_eq!(signature_category, Some(groceries));
    }

    #[tokio::test]
    async fn unknown_ids_and_categories_are_reported() {
        let pool = create_memory_db().await.unwrap();
        let result = auto_categorize(&pool, &[999]).await;
        assert!(matches!(result, Err(CategorizeError::NotFound(999))));

        let ids = seeded(&pool, vec![tx("2024-01-02", "ICA", "-10.00")]).await;
        let result = manual_categorize(&pool, &ids, 424242).await;
        assert!(matches!(result, Err(CategorizeError::UnknownCategory(424242))));
    }
}
