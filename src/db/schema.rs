//! Live schema introspection.
//!
//! Column definitions come from `pragma_table_info` and are resolved once per
//! table into a [`TableSchema`], so per-row work never re-reads declared type
//! strings.

use serde::Serialize;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::{AppError, AppResult};

/// Tables that hold business records and may be imported, exported or listed
/// by name.
pub const ENTITY_TABLES: &[&str] = &[
    "customers",
    "equipment",
    "work_orders",
    "invoices",
    "invoice_items",
    "business_info",
];

pub fn ensure_entity_table(table: &str) -> AppResult<()> {
    if ENTITY_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(
            AppError::new("VALIDATION/UNKNOWN_TABLE", format!("Unknown table: {table}"))
                .with_context("table", table.to_string()),
        )
    }
}

/// Storage class a column coerces imported text into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Other,
}

impl ColumnType {
    /// Map a declared type to a storage class following SQLite's affinity
    /// rules, in the same precedence order.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Other
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub not_null: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub async fn load(pool: &SqlitePool, table: &str) -> AppResult<Self> {
        let mut conn = pool.acquire().await?;
        Self::load_with(&mut *conn, table).await
    }

    pub async fn load_with<'e, E>(executor: E, table: &str) -> AppResult<Self>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            "SELECT name, type, pk, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(executor)
        .await?;

        if rows.is_empty() {
            return Err(AppError::new(
                "VALIDATION/UNKNOWN_TABLE",
                format!("Table does not exist: {table}"),
            )
            .with_context("table", table.to_string()));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let declared_type: String = row.try_get("type")?;
            let pk: i64 = row.try_get("pk")?;
            let not_null: i64 = row.try_get("notnull")?;
            columns.push(ColumnInfo {
                column_type: ColumnType::from_declared(&declared_type),
                name,
                declared_type,
                primary_key: pk > 0,
                not_null: not_null != 0,
            });
        }

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First primary-key column, or a column literally named `id`.
    pub fn primary_key(&self) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .or_else(|| self.column("id"))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Header names that are not live columns of this table.
    pub fn unknown_columns<'a>(&self, header: &'a [String]) -> Vec<&'a str> {
        header
            .iter()
            .filter(|h| self.column(h).is_none())
            .map(String::as_str)
            .collect()
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub async fn table_exists<'e, E>(executor: E, table: &str) -> AppResult<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1")
            .bind(table)
            .fetch_optional(executor)
            .await?;
    Ok(exists.is_some())
}

pub async fn column_exists<'e, E>(executor: E, table: &str, column: &str) -> AppResult<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")
            .bind(table)
            .bind(column)
            .fetch_optional(executor)
            .await?;
    Ok(exists.is_some())
}
