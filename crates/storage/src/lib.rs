//! SQLite persistence for transactions, signatures and categories.

pub mod categorize;
pub mod db;
pub mod signatures;
pub mod transactions;

pub use categorize::{
    auto_categorize, change_category, manual_categorize, validate_same_sign, CategorizeError,
    CategorizeOutcome,
};
pub use db::{create_db, create_memory_db, DbPool};
pub use signatures::{cleanup_orphans, LoadedSignatureIndex, SignatureStore};
pub use transactions::{
    commit_import, existing_fingerprint_counts, CommittedImport, StoredTransaction,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}
