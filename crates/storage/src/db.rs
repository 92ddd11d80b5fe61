use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use kassabok_core::{SEED_CATEGORIES, SEED_GROUPS};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    seed_categories(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema and seeds. Test use.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    run_migrations(&pool).await?;
    seed_categories(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL,
            key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            user_display_name TEXT,
            is_system INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (group_id) REFERENCES category_groups(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signatures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            normalized_description TEXT NOT NULL,
            kind TEXT NOT NULL,
            is_positive INTEGER NOT NULL,
            is_machine_generated INTEGER NOT NULL DEFAULT 0,
            machine_confidence REAL NOT NULL DEFAULT 0,
            merchant_candidate TEXT,
            note TEXT,
            source TEXT NOT NULL DEFAULT 'Auto',
            seen_count INTEGER NOT NULL DEFAULT 1,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            algorithm_version TEXT NOT NULL,
            category_id INTEGER,
            UNIQUE (normalized_description, kind, is_positive),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT NOT NULL UNIQUE,
            fingerprint TEXT NOT NULL,
            booking_date TEXT,
            transaction_date TEXT NOT NULL,
            description TEXT NOT NULL,
            normalized_description TEXT NOT NULL,
            amount TEXT NOT NULL,
            balance TEXT,
            type_raw TEXT,
            kind TEXT NOT NULL,
            category_id INTEGER,
            signature_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (signature_id) REFERENCES signatures(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_fingerprint ON transactions(fingerprint)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn seed_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (key, display_name, sort_order) in SEED_GROUPS {
        sqlx::query(
            "INSERT OR IGNORE INTO category_groups (key, display_name, sort_order) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(display_name)
        .bind(sort_order)
        .execute(pool)
        .await?;
    }

    for (group_key, key, display_name, sort_order) in SEED_CATEGORIES {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO categories (group_id, key, display_name, is_system, sort_order)
            SELECT id, ?, ?, 1, ? FROM category_groups WHERE key = ?
            "#,
        )
        .bind(key)
        .bind(display_name)
        .bind(sort_order)
        .bind(group_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn category_id_by_key(pool: &DbPool, key: &str) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM categories WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}
