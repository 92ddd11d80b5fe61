//! Bank-export ingestion: layout detection, column profiling, schema
//! inference, row parsing, and dedup planning for pasted statement text.

pub mod card;
pub mod config;
pub mod layout;
pub mod parser;
pub mod preview;
pub mod profile;
pub mod schema;
pub mod solver;
pub mod value;

pub use config::{BankProfile, ConfigError, HeaderField, ImportConfig, BASE_PROFILE_JSON};
pub use layout::{detect_layout, DetectedLayout, LayoutError, RawRow, RowClass};
pub use parser::{
    parse_rows, plan_import, DuplicateGroup, ImportPlan, ParseOutcome, RowError, RowErrorKind,
};
pub use preview::{build_preview, ColumnHint, ImportPreview, PreviewRow, RowStatus};
pub use profile::{profile_columns, ColumnProfile, EmptySignatureIndex, SignatureIndex};
pub use schema::{resolve_schema, ManualSchema, ResolvedSchema, Schema, SchemaError, SchemaSource};
pub use solver::{solve, ColumnMap};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One-stop pipeline front: detect, resolve, parse.
pub struct Importer<'a> {
    config: &'a ImportConfig,
    signatures: &'a dyn SignatureIndex,
}

impl<'a> Importer<'a> {
    pub fn new(config: &'a ImportConfig, signatures: &'a dyn SignatureIndex) -> Self {
        Importer { config, signatures }
    }

    /// Full preview for operator confirmation; nothing is committed.
    pub fn preview(&self, raw: &str) -> Result<ImportPreview, ImportError> {
        let layout = detect_layout(raw, self.config)?;
        let resolved = resolve_schema(&layout, self.config, self.signatures, None)?;
        Ok(build_preview(&layout, &resolved, self.config, self.signatures))
    }

    /// Parse raw text into transactions and row errors, using the manual
    /// schema when one is supplied.
    pub fn parse(
        &self,
        raw: &str,
        manual: Option<&ManualSchema>,
    ) -> Result<ParseOutcome, ImportError> {
        let layout = detect_layout(raw, self.config)?;
        let resolved = resolve_schema(&layout, self.config, self.signatures, manual)?;
        Ok(parse_rows(&layout.rows, &resolved, self.config))
    }
}
