use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use tokio::task;
use tracing::info;

use crate::capabilities::Capabilities;
use crate::db::schema::{ensure_entity_table, quote_ident, TableSchema};
use crate::db::{write_atomic, Store};
use crate::import::FileFormat;
use crate::{AppError, AppResult};

const SHEET_NAME_MAX: usize = 31;
const COLUMN_WIDTH_MAX: usize = 100;

/// A full scan of one table with typed values.
#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

fn cell_value(row: &SqliteRow, idx: usize) -> Value {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    match raw.type_info().name() {
        "INTEGER" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

pub async fn dump_table(pool: &SqlitePool, table: &str) -> AppResult<TableDump> {
    ensure_entity_table(table)?;
    let schema = TableSchema::load(pool, table).await?;
    let columns: Vec<String> = schema.columns.iter().map(|c| c.name.clone()).collect();
    let select = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {select} FROM {} ORDER BY rowid", quote_ident(table));
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| (0..columns.len()).map(|i| cell_value(row, i)).collect())
        .collect();
    Ok(TableDump {
        table: table.to_string(),
        columns,
        rows,
    })
}

/// Export `table` to `path`, choosing the format from the extension.
/// Returns the number of rows written.
pub async fn export_table(
    store: &Store,
    caps: Capabilities,
    table: &str,
    path: &Path,
) -> AppResult<usize> {
    let format = FileFormat::from_path(path);
    if format == FileFormat::Excel {
        caps.require_excel()?;
    }
    let dump = dump_table(store.pool(), table).await?;
    let count = dump.rows.len();

    let out: PathBuf = path.to_path_buf();
    task::spawn_blocking(move || write_dump(&dump, format, &out))
        .await
        .map_err(|err| {
            AppError::new("EXPORT/TASK", "Export writer task panicked")
                .with_context("error", err.to_string())
        })?
        .map_err(|err| err.with_context("path", path.display().to_string()))?;

    info!(
        target: "repairdesk",
        event = "export_written",
        table,
        rows = count,
        path = %path.display()
    );
    Ok(count)
}

fn write_dump(dump: &TableDump, format: FileFormat, path: &Path) -> AppResult<()> {
    let bytes = match format {
        FileFormat::Csv => csv_bytes(dump)?,
        FileFormat::Json => json_bytes(dump)?,
        FileFormat::Excel => xlsx_bytes(dump)?,
    };
    write_atomic(path, &bytes)?;
    Ok(())
}

fn text_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_bytes(dump: &TableDump) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&dump.columns)?;
    for row in &dump.rows {
        writer.write_record(row.iter().map(text_cell))?;
    }
    writer
        .into_inner()
        .map_err(|err| AppError::from(err.into_error()).with_context("operation", "flush_csv"))
}

fn json_bytes(dump: &TableDump) -> AppResult<Vec<u8>> {
    let objects: Vec<Value> = dump
        .rows
        .iter()
        .map(|row| {
            let map: Map<String, Value> = dump
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            Value::Object(map)
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&objects)?)
}

/// Sheet names are capped by the file format.
pub fn sheet_name(table: &str) -> String {
    table.chars().take(SHEET_NAME_MAX).collect()
}

/// Width that fits the longest rendered cell of each column, plus padding.
pub fn column_widths(dump: &TableDump) -> Vec<usize> {
    dump.columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let longest = dump
                .rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|v| text_cell(v).chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            (longest + 2).min(COLUMN_WIDTH_MAX)
        })
        .collect()
}

#[cfg(feature = "excel")]
fn xlsx_bytes(dump: &TableDump) -> AppResult<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(&dump.table))?;

    for (col, name) in dump.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, &bold)?;
    }
    for (r, row) in dump.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            match value {
                Value::Null => {}
                Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        sheet.write_number(r, col, f)?;
                    }
                }
                other => {
                    sheet.write_string(r, col, text_cell(other))?;
                }
            }
        }
    }
    for (col, width) in column_widths(dump).into_iter().enumerate() {
        sheet.set_column_width(col as u16, width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(not(feature = "excel"))]
fn xlsx_bytes(_dump: &TableDump) -> AppResult<Vec<u8>> {
    Err(AppError::capability_missing("excel"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump() -> TableDump {
        TableDump {
            table: "invoices".into(),
            columns: vec!["id".into(), "amount".into(), "notes".into()],
            rows: vec![
                vec![Value::from(1), Value::from(12.5), Value::Null],
                vec![Value::from(2), Value::from(80.0), Value::from("x".repeat(150))],
            ],
        }
    }

    #[test]
    fn csv_renders_null_as_empty() {
        let text = String::from_utf8(csv_bytes(&dump()).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,amount,notes"));
        assert_eq!(lines.next(), Some("1,12.5,"));
    }

    #[test]
    fn json_keeps_value_types() {
        let parsed: Value = serde_json::from_slice(&json_bytes(&dump()).unwrap()).unwrap();
        assert_eq!(parsed[0]["id"], Value::from(1));
        assert_eq!(parsed[0]["amount"], Value::from(12.5));
        assert!(parsed[0]["notes"].is_null());
    }

    #[test]
    fn json_keys_follow_column_order() {
        let text = String::from_utf8(json_bytes(&dump()).unwrap()).unwrap();
        let pos = |key: &str| text.find(&format!("\"{key}\"")).unwrap();
        assert!(pos("id") < pos("amount"));
        assert!(pos("amount") < pos("notes"));
    }

    #[test]
    fn widths_fit_content_and_cap() {
        assert_eq!(column_widths(&dump()), vec![4, 8, 100]);
    }

    #[test]
    fn sheet_names_are_truncated() {
        assert_eq!(sheet_name("customers"), "customers");
        assert_eq!(sheet_name(&"t".repeat(40)).len(), 31);
    }

    #[tokio::test]
    async fn excel_export_requires_capability() {
        let store = Store::open_in_memory().await.unwrap();
        let err = export_table(&store, Capabilities::none(), "customers", Path::new("out.xlsx"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), AppError::CAPABILITY_MISSING);
    }
}
