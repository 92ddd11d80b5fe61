use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use kassabok_core::SignatureHeuristics;
use kassabok_import::{
    ImportConfig, ImportPreview, Importer, ManualSchema, RowStatus, BASE_PROFILE_JSON,
};
use kassabok_storage::{
    auto_categorize, cleanup_orphans, commit_import, create_db, db::category_id_by_key,
    manual_categorize, transactions, DbPool, LoadedSignatureIndex,
};

/// Built-in base profile plus any bank override files, merged in order.
/// Without explicit `--profile` flags, `import.default.json` and `banks/*.json`
/// from the config directory are picked up.
pub fn load_config(profiles: &[PathBuf]) -> Result<ImportConfig> {
    let paths = if profiles.is_empty() {
        discover_profiles()
    } else {
        profiles.to_vec()
    };
    if paths.is_empty() {
        return Ok(ImportConfig::default());
    }
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        files.push((path.display().to_string(), json));
    }
    let sources = std::iter::once(("builtin", BASE_PROFILE_JSON))
        .chain(files.iter().map(|(name, json)| (name.as_str(), json.as_str())));
    Ok(ImportConfig::from_sources(sources)?)
}

fn discover_profiles() -> Vec<PathBuf> {
    let Some(dirs) = ProjectDirs::from("se", "kassabok", "kassabok") else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    let base = dirs.config_dir().join("import.default.json");
    if base.is_file() {
        paths.push(base);
    }
    if let Ok(entries) = std::fs::read_dir(dirs.config_dir().join("banks")) {
        let mut banks: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        banks.sort();
        paths.append(&mut banks);
    }
    paths
}

pub fn load_manual_schema(path: &Path) -> Result<ManualSchema> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing schema {}", path.display()))
}

async fn open_db(db: &Option<PathBuf>) -> Result<DbPool> {
    let path = match db {
        Some(path) => path.clone(),
        None => {
            let dirs = ProjectDirs::from("se", "kassabok", "kassabok")
                .context("could not resolve a data directory")?;
            std::fs::create_dir_all(dirs.data_dir())
                .with_context(|| format!("creating {}", dirs.data_dir().display()))?;
            dirs.data_dir().join("kassabok.db")
        }
    };
    let pool = create_db(&path)
        .await
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(pool)
}

pub async fn preview(db: &Option<PathBuf>, config: &ImportConfig, raw: &str) -> Result<()> {
    let pool = open_db(db).await?;
    let signatures = LoadedSignatureIndex::load(&pool).await?;
    let importer = Importer::new(config, &signatures);
    let preview = importer.preview(raw)?;
    print_preview(&preview);
    Ok(())
}

fn print_preview(preview: &ImportPreview) {
    println!(
        "Separator: {:?}  Columns: {}  Layout confidence: {:.0}%  Schema confidence: {:.0}% ({:?})",
        preview.separator,
        preview.column_count,
        preview.layout_confidence * 100.0,
        preview.schema_confidence * 100.0,
        preview.schema_source,
    );
    println!();
    for column in &preview.columns {
        let field = match column.suggested_field {
            Some(field) => field.to_string(),
            None => "-".to_string(),
        };
        println!("  [{}] {} -> {}", column.index, column.display_name, field);
    }
    println!();

    let accepted = preview
        .rows
        .iter()
        .filter(|r| r.status == RowStatus::Accepted)
        .count();
    println!("Rows: {} total, {} accepted", preview.rows.len(), accepted);
    for row in &preview.rows {
        if let Some(reason) = &row.reason {
            println!("  line {}: {}", row.line, reason);
        }
    }
}

pub async fn import(
    db: &Option<PathBuf>,
    config: &ImportConfig,
    raw: &str,
    manual: Option<&ManualSchema>,
    run_auto_categorize: bool,
) -> Result<()> {
    let pool = open_db(db).await?;
    let signatures = LoadedSignatureIndex::load(&pool).await?;
    let importer = Importer::new(config, &signatures);
    let outcome = importer.parse(raw, manual)?;
    tracing::debug!(
        rows = outcome.transactions.len(),
        errors = outcome.errors.len(),
        "parsed import file"
    );

    let committed =
        commit_import(&pool, outcome.transactions, SignatureHeuristics::default()).await?;

    println!("Imported {} transactions", committed.inserted_ids.len());
    for error in &outcome.errors {
        println!("  parse error: {error}");
    }
    for group in &committed.duplicates {
        println!(
            "  duplicate: {} row(s) \"{}\" already imported",
            group.row_count, group.description
        );
    }

    if run_auto_categorize && !committed.inserted_ids.is_empty() {
        // Categorization batches must be same-sign; split before calling.
        let inserted = transactions::fetch_many(&pool, &committed.inserted_ids).await?;
        let (positive, negative): (Vec<_>, Vec<_>) =
            inserted.iter().partition(|t| t.amount >= Decimal::ZERO);
        for batch in [positive, negative] {
            if batch.is_empty() {
                continue;
            }
            let ids: Vec<i64> = batch.iter().map(|t| t.id).collect();
            let outcome = auto_categorize(&pool, &ids).await?;
            if outcome.categorized > 0 {
                println!("Auto-categorized {} transactions", outcome.categorized);
            }
            for (id, error) in &outcome.errors {
                println!("  categorization error on {id}: {error}");
            }
        }
    }

    Ok(())
}

pub async fn categorize(db: &Option<PathBuf>, ids: &[i64], category: &str) -> Result<()> {
    let pool = open_db(db).await?;
    let Some(category_id) = category_id_by_key(&pool, category).await? else {
        bail!("unknown category key: {category}");
    };
    let outcome = manual_categorize(&pool, ids, category_id).await?;
    println!(
        "Categorized {} transactions as {category}",
        outcome.categorized
    );
    for (id, error) in &outcome.errors {
        println!("  error on {id}: {error}");
    }
    Ok(())
}

pub async fn list(db: &Option<PathBuf>, limit: i64) -> Result<()> {
    let pool = open_db(db).await?;
    let rows = transactions::list_recent(&pool, limit).await?;
    for t in &rows {
        println!(
            "{:>5}  {}  {:>12}  {:<12}  {}",
            t.id,
            t.transaction_date,
            t.amount,
            t.kind.as_str(),
            t.description
        );
    }
    Ok(())
}

pub async fn cleanup_signatures(db: &Option<PathBuf>) -> Result<()> {
    let pool = open_db(db).await?;
    let deleted = cleanup_orphans(&pool).await?;
    println!("Removed {deleted} orphaned signatures");
    Ok(())
}
