use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use super::coerce::{bind_cell, coerce_cell, CellValue};
use super::readers::TabularData;
use super::ImportError;
use crate::db::schema::{ensure_entity_table, quote_ident, ColumnInfo, TableSchema};
use crate::AppResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

enum RowOutcome {
    Inserted,
    Updated,
}

/// Reject headers naming columns the table does not have.
pub fn validate_header(schema: &TableSchema, header: &[String]) -> Result<(), ImportError> {
    let unknown = schema.unknown_columns(header);
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ImportError::UnknownColumns {
            table: schema.table.clone(),
            columns: unknown.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Merge `data` into `table`, keyed by primary key.
pub async fn upsert_rows(
    pool: &SqlitePool,
    table: &str,
    data: &TabularData,
) -> AppResult<ImportSummary> {
    ensure_entity_table(table)?;
    let schema = TableSchema::load(pool, table).await?;
    validate_header(&schema, &data.header)?;
    upsert_with_schema(pool, &schema, data).await
}

/// Merge against an already loaded and validated schema.
///
/// Runs in one transaction. A row that fails is logged and counted as skipped;
/// the remaining rows still apply.
pub async fn upsert_with_schema(
    pool: &SqlitePool,
    schema: &TableSchema,
    data: &TabularData,
) -> AppResult<ImportSummary> {
    validate_header(schema, &data.header)?;

    let columns: Vec<&ColumnInfo> = data
        .header
        .iter()
        .filter_map(|name| schema.column(name))
        .collect();
    let pk = schema.primary_key();

    let mut summary = ImportSummary::default();
    let mut tx = pool.begin().await?;
    for (index, raw) in data.rows.iter().enumerate() {
        let cells = coerce_row(&columns, raw);
        match upsert_row(&mut tx, schema, pk, &cells).await {
            Ok(RowOutcome::Inserted) => summary.inserted += 1,
            Ok(RowOutcome::Updated) => summary.updated += 1,
            Err(err) => {
                summary.skipped += 1;
                warn!(
                    target: "repairdesk",
                    event = "import_row_skipped",
                    table = %schema.table,
                    row = index + 1,
                    error = %err
                );
            }
        }
    }
    tx.commit().await?;

    info!(
        target: "repairdesk",
        event = "import_merged",
        table = %schema.table,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped
    );
    Ok(summary)
}

/// Pair each header column with its coerced cell. A repeated header name keeps
/// the last value.
fn coerce_row<'a>(columns: &[&'a ColumnInfo], raw: &[String]) -> Vec<(&'a ColumnInfo, CellValue)> {
    let mut cells: Vec<(&ColumnInfo, CellValue)> = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value = coerce_cell(raw.get(i).map(String::as_str).unwrap_or(""), column.column_type);
        if let Some(slot) = cells.iter_mut().find(|(c, _)| c.name == column.name) {
            slot.1 = value;
        } else {
            cells.push((column, value));
        }
    }
    cells
}

async fn upsert_row(
    tx: &mut Transaction<'static, Sqlite>,
    schema: &TableSchema,
    pk: Option<&ColumnInfo>,
    cells: &[(&ColumnInfo, CellValue)],
) -> AppResult<RowOutcome> {
    let table = quote_ident(&schema.table);
    let key = pk.and_then(|pk| {
        cells
            .iter()
            .find(|(c, v)| c.name == pk.name && !v.is_null())
            .map(|(c, v)| (*c, v))
    });

    if let Some((pk_col, pk_value)) = key {
        let lookup = format!(
            "SELECT 1 FROM {table} WHERE {} = ?1",
            quote_ident(&pk_col.name)
        );
        let exists = bind_cell(sqlx::query(&lookup), pk_value)
            .fetch_optional(&mut **tx)
            .await?
            .is_some();

        if exists {
            let rest: Vec<_> = cells.iter().filter(|(c, _)| c.name != pk_col.name).collect();
            if !rest.is_empty() {
                let assignments = rest
                    .iter()
                    .map(|(c, _)| format!("{} = ?", quote_ident(&c.name)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {table} SET {assignments} WHERE {} = ?",
                    quote_ident(&pk_col.name)
                );
                let mut q = sqlx::query(&sql);
                for (_, value) in &rest {
                    q = bind_cell(q, value);
                }
                q = bind_cell(q, pk_value);
                q.execute(&mut **tx).await?;
            }
            return Ok(RowOutcome::Updated);
        }
    }

    let insert: Vec<_> = cells
        .iter()
        .filter(|(c, v)| !(pk.is_some_and(|pk| pk.name == c.name) && v.is_null()))
        .collect();
    if insert.is_empty() {
        sqlx::query(&format!("INSERT INTO {table} DEFAULT VALUES"))
            .execute(&mut **tx)
            .await?;
    } else {
        let names = insert
            .iter()
            .map(|(c, _)| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; insert.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");
        let mut q = sqlx::query(&sql);
        for (_, value) in &insert {
            q = bind_cell(q, value);
        }
        q.execute(&mut **tx).await?;
    }
    Ok(RowOutcome::Inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    async fn parts_store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY AUTOINCREMENT, first_name TEXT, balance REAL)",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO customers (id, first_name, balance) VALUES (1, 'Ada', 1.0)")
            .execute(store.pool())
            .await
            .unwrap();
        store
    }

    fn data(header: &[&str], rows: &[&[&str]]) -> TabularData {
        TabularData {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[tokio::test]
    async fn matching_pk_updates_without_insert() {
        let store = parts_store().await;
        let summary = upsert_rows(
            store.pool(),
            "customers",
            &data(&["id", "first_name"], &[&["1", "Augusta"]]),
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { inserted: 0, updated: 1, skipped: 0 });

        let (name, balance): (String, f64) =
            sqlx::query_as("SELECT first_name, balance FROM customers WHERE id = 1")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(name, "Augusta");
        assert_eq!(balance, 1.0);
    }

    #[tokio::test]
    async fn blank_or_unknown_pk_inserts() {
        let store = parts_store().await;
        let summary = upsert_rows(
            store.pool(),
            "customers",
            &data(
                &["id", "first_name", "balance"],
                &[&["", "Grace", "12.50"], &["40", "Linus", ""]],
            ),
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { inserted: 2, updated: 0, skipped: 0 });

        let balance: f64 = sqlx::query_scalar("SELECT balance FROM customers WHERE first_name = 'Grace'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(balance, 12.5);
        let linus: Option<f64> = sqlx::query_scalar("SELECT balance FROM customers WHERE id = 40")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(linus, None);
    }

    #[tokio::test]
    async fn unknown_column_rejects_whole_file() {
        let store = parts_store().await;
        let err = upsert_rows(
            store.pool(),
            "customers",
            &data(&["first_name", "shoe_size"], &[&["Grace", "9"]]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION/UNKNOWN_COLUMNS");
        assert_eq!(err.context().get("columns").map(String::as_str), Some("shoe_size"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn failing_row_is_skipped_not_fatal() {
        let store = Store::open_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE customers (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL)")
            .execute(store.pool())
            .await
            .unwrap();
        let summary = upsert_rows(
            store.pool(),
            "customers",
            &data(&["id", "first_name"], &[&["1", ""], &["2", "Ada"]]),
        )
        .await
        .unwrap();
        assert_eq!(summary, ImportSummary { inserted: 1, updated: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn non_entity_table_is_refused() {
        let store = parts_store().await;
        let err = upsert_rows(store.pool(), "schema_version", &data(&["version"], &[&["9"]]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION/UNKNOWN_TABLE");
    }
}
