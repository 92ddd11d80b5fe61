//! Transaction persistence and the dedup-guarded import commit.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::db::DbPool;
use crate::signatures::SignatureStore;
use crate::StorageError;
use kassabok_core::{ParsedTransaction, SignatureHeuristics, TransactionKind};
use kassabok_import::{plan_import, DuplicateGroup};

/// A persisted transaction row.
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub id: i64,
    pub import_id: String,
    pub fingerprint: String,
    pub booking_date: Option<NaiveDate>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub normalized_description: String,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
    pub type_raw: Option<String>,
    pub kind: TransactionKind,
    pub category_id: Option<i64>,
    pub signature_id: Option<i64>,
}

/// Result of committing one import.
#[derive(Debug, Default)]
pub struct CommittedImport {
    pub inserted_ids: Vec<i64>,
    pub duplicates: Vec<DuplicateGroup>,
}

/// How many transactions storage already holds per fingerprint key.
pub async fn existing_fingerprint_counts(
    pool: &DbPool,
    keys: &[String],
) -> Result<HashMap<String, i64>, StorageError> {
    let mut counts = HashMap::new();
    for key in keys {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE fingerprint = ?")
                .bind(key)
                .fetch_one(pool)
                .await?;
        if count > 0 {
            counts.insert(key.clone(), count);
        }
    }
    Ok(counts)
}

/// Commit parsed transactions: check fingerprints, reject duplicate groups,
/// insert the rest and their signatures.
///
/// The whole read-then-write sequence runs inside one immediate transaction
/// on the single-connection pool, so two overlapping imports cannot both pass
/// the duplicate check; the unique `import_id` index backstops it.
pub async fn commit_import(
    pool: &DbPool,
    transactions: Vec<ParsedTransaction>,
    heuristics: SignatureHeuristics,
) -> Result<CommittedImport, StorageError> {
    if transactions.is_empty() {
        return Ok(CommittedImport::default());
    }

    let keys: Vec<String> = transactions
        .iter()
        .map(|t| t.fingerprint().key())
        .collect();

    sqlx::query("BEGIN IMMEDIATE").execute(pool).await?;
    let result = commit_inner(pool, transactions, keys, heuristics).await;
    match &result {
        Ok(_) => {
            sqlx::query("COMMIT").execute(pool).await?;
        }
        Err(_) => {
            let _ = sqlx::query("ROLLBACK").execute(pool).await;
        }
    }
    result
}

async fn commit_inner(
    pool: &DbPool,
    transactions: Vec<ParsedTransaction>,
    keys: Vec<String>,
    heuristics: SignatureHeuristics,
) -> Result<CommittedImport, StorageError> {
    let existing = existing_fingerprint_counts(pool, &keys).await?;
    let plan = plan_import(transactions, &existing);

    let mut store = SignatureStore::new(heuristics);
    let mut identities: Vec<(String, String, bool)> = Vec::with_capacity(plan.accepted.len());
    let mut known_ids: Vec<Option<i64>> = Vec::with_capacity(plan.accepted.len());
    for transaction in &plan.accepted {
        let signature = store
            .get_or_create(
                pool,
                &transaction.normalized_description,
                transaction.kind,
                transaction.amount,
                &transaction.description,
            )
            .await?;
        identities.push((
            signature.normalized_description.clone(),
            signature.kind.as_str().to_string(),
            signature.is_positive,
        ));
        known_ids.push(signature.id);
    }
    let flushed = store.flush(pool).await?;

    let mut inserted_ids = Vec::with_capacity(plan.accepted.len());
    for (i, transaction) in plan.accepted.iter().enumerate() {
        let signature_id = known_ids[i].or_else(|| flushed.get(&identities[i]).copied());
        let result = sqlx::query(
            "INSERT INTO transactions (import_id, fingerprint, booking_date, transaction_date, \
             description, normalized_description, amount, balance, type_raw, kind, signature_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.import_id)
        .bind(transaction.fingerprint().key())
        .bind(transaction.booking_date.map(|d| d.to_string()))
        .bind(transaction.transaction_date.to_string())
        .bind(&transaction.description)
        .bind(&transaction.normalized_description)
        .bind(transaction.amount.to_string())
        .bind(transaction.balance.map(|b| b.to_string()))
        .bind(&transaction.type_raw)
        .bind(transaction.kind.as_str())
        .bind(signature_id)
        .execute(pool)
        .await?;
        inserted_ids.push(result.last_insert_rowid());
    }

    tracing::info!(
        inserted = inserted_ids.len(),
        duplicate_groups = plan.duplicates.len(),
        "import committed"
    );

    Ok(CommittedImport {
        inserted_ids,
        duplicates: plan.duplicates,
    })
}

pub async fn fetch_by_id(
    pool: &DbPool,
    id: i64,
) -> Result<Option<StoredTransaction>, StorageError> {
    let row = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, import_id, fingerprint, booking_date, transaction_date, description, \
         normalized_description, amount, balance, type_raw, kind, category_id, signature_id \
         FROM transactions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(TransactionRow::into_stored).transpose()
}

pub async fn fetch_many(
    pool: &DbPool,
    ids: &[i64],
) -> Result<Vec<StoredTransaction>, StorageError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(t) = fetch_by_id(pool, *id).await? {
            out.push(t);
        }
    }
    Ok(out)
}

pub async fn list_recent(
    pool: &DbPool,
    limit: i64,
) -> Result<Vec<StoredTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, import_id, fingerprint, booking_date, transaction_date, description, \
         normalized_description, amount, balance, type_raw, kind, category_id, signature_id \
         FROM transactions ORDER BY transaction_date DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TransactionRow::into_stored).collect()
}

pub async fn set_category(
    pool: &DbPool,
    transaction_id: i64,
    category_id: Option<i64>,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE transactions SET category_id = ? WHERE id = ?")
        .bind(category_id)
        .bind(transaction_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    import_id: String,
    fingerprint: String,
    booking_date: Option<String>,
    transaction_date: String,
    description: String,
    normalized_description: String,
    amount: String,
    balance: Option<String>,
    type_raw: Option<String>,
    kind: String,
    category_id: Option<i64>,
    signature_id: Option<i64>,
}

impl TransactionRow {
    fn into_stored(self) -> Result<StoredTransaction, StorageError> {
        Ok(StoredTransaction {
            id: self.id,
            import_id: self.import_id,
            fingerprint: self.fingerprint,
            booking_date: self.booking_date.as_deref().map(parse_date).transpose()?,
            transaction_date: parse_date(&self.transaction_date)?,
            description: self.description,
            normalized_description: self.normalized_description,
            amount: parse_decimal(&self.amount)?,
            balance: self.balance.as_deref().map(parse_decimal).transpose()?,
            type_raw: self.type_raw,
            kind: self
                .kind
                .parse()
                .map_err(|e: String| StorageError::Corrupt(e))?,
            category_id: self.category_id,
            signature_id: self.signature_id,
        })
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::from_str(text).map_err(|e| StorageError::Corrupt(format!("date '{text}': {e}")))
}

fn parse_decimal(text: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(text).map_err(|e| StorageError::Corrupt(format!("amount '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_db;
    use kassabok_core::normalize_text;

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

    #[tokio::test]
    async fn commit_inserts_and_links_signatures() {
        let pool = create_memory_db().await.unwrap();
        let committed = commit_import(
            &pool,
            vec![
                tx("2024-01-02", "ICA SUPERMARKET AB", "-123.45"),
                tx("2024-01-03", "COOP FORUM AB", "-67.89"),
            ],
            SignatureHeuristics::default(),
        )
        .await
        .unwrap();
        assert_eq!(committed.inserted_ids.len(), 2);
        assert!(committed.duplicates.is_empty());

        let stored = fetch_by_id(&pool, committed.inserted_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.description, "ICA SUPERMARKET AB");
        assert_eq!(stored.amount, Decimal::from_str("-123.45").unwrap());
        assert!(stored.signature_id.is_some());
        assert!(stored.import_id.ends_with(":0"));
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let pool = create_memory_db().await.unwrap();
        let rows = || {
            vec![
                tx("2024-01-02", "ICA", "-10.00"),
                tx("2024-01-03", "COOP", "-20.00"),
            ]
        };
        let first = commit_import(&pool, rows(), SignatureHeuristics::default())
            .await
            .unwrap();
        assert_eq!(first.inserted_ids.len(), 2);

        let second = commit_import(&pool, rows(), SignatureHeuristics::default())
            .await
            .unwrap();
        assert!(second.inserted_ids.is_empty());
        assert_eq!(second.duplicates.len(), 2);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn repeated_rows_in_one_statement_both_insert() {
        let pool = create_memory_db().await.unwrap();
        let committed = commit_import(
            &pool,
            vec![
                tx("2024-01-02", "PRESSBYRÅN", "-35.00"),
                tx("2024-01-02", "PRESSBYRÅN", "-35.00"),
            ],
            SignatureHeuristics::default(),
        )
        .await
        .unwrap();
        assert_eq!(committed.inserted_ids.len(), 2);
        let both = fetch_many(&pool, &committed.inserted_ids).await.unwrap();
        assert!(both[0].import_id.ends_with(":0"));
        assert!(both[1].import_id.ends_with(":1"));
        assert_eq!(both[0].fingerprint, both[1].fingerprint);
    }
}
