use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::task;

use crate::capabilities::Capabilities;
use crate::config::AppConfig;
use crate::db::backup::{backup_and_prune, BackupReason};
use crate::db::schema::{ensure_entity_table, TableSchema};
use crate::db::Store;
use crate::{AppError, AppResult};

pub mod coerce;
pub mod readers;
pub mod upsert;

pub use coerce::{coerce_cell, CellValue};
pub use readers::{read_file, FileFormat, TabularData};
pub use upsert::{upsert_rows, upsert_with_schema, validate_header, ImportSummary};

const PREVIEW_ROWS: usize = 5;

/// Reasons an import is refused before anything is written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("columns not in table {table}: {}", columns.join(", "))]
    UnknownColumns { table: String, columns: Vec<String> },
    #[error("unsupported JSON layout: {0}")]
    JsonShape(String),
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        let message = err.to_string();
        match err {
            ImportError::UnknownColumns { table, columns } => {
                AppError::new("VALIDATION/UNKNOWN_COLUMNS", message)
                    .with_context("table", table)
                    .with_context("columns", columns.join(", "))
            }
            ImportError::JsonShape(_) => AppError::new("VALIDATION/JSON_SHAPE", message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub table: String,
    pub format: FileFormat,
    pub header: Vec<String>,
    pub row_count: usize,
    pub sample: Vec<Vec<String>>,
}

async fn load_file(path: &Path, caps: Capabilities) -> AppResult<TabularData> {
    let path: PathBuf = path.to_path_buf();
    task::spawn_blocking(move || read_file(&path, &caps))
        .await
        .map_err(|err| {
            AppError::new("IMPORT/TASK", "Import reader task panicked")
                .with_context("error", err.to_string())
        })?
}

/// Read and validate `path` against `table` without writing anything.
pub async fn preview_file(
    store: &Store,
    caps: Capabilities,
    table: &str,
    path: &Path,
) -> AppResult<ImportPreview> {
    ensure_entity_table(table)?;
    let data = load_file(path, caps).await?;
    let schema = TableSchema::load(store.pool(), table).await?;
    validate_header(&schema, &data.header)?;

    Ok(ImportPreview {
        table: table.to_string(),
        format: FileFormat::from_path(path),
        row_count: data.rows.len(),
        sample: data.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
        header: data.header,
    })
}

/// Import `path` into `table`.
///
/// The header is validated before the store is touched; then the file is
/// backed up with the `import` prefix (best effort) and merged.
pub async fn import_file(
    store: &Store,
    config: &AppConfig,
    caps: Capabilities,
    table: &str,
    path: &Path,
) -> AppResult<ImportSummary> {
    ensure_entity_table(table)?;
    let data = load_file(path, caps).await?;
    let schema = TableSchema::load(store.pool(), table).await?;
    validate_header(&schema, &data.header)?;

    backup_and_prune(config, BackupReason::Import).await;

    upsert_with_schema(store.pool(), &schema, &data)
        .await
        .map_err(|err| err.with_context("path", path.display().to_string()))
}
