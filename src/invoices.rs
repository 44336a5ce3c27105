use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::repo::delete_by_id;
use crate::{AppError, AppResult};

pub const STATUS_OUTSTANDING: &str = "Outstanding";
pub const STATUS_PAID: &str = "Paid";

/// `amount` as REAL, or NULL when an import left non-numeric text in it.
pub(crate) const AMOUNT_SQL: &str =
    "CASE WHEN typeof(amount) IN ('integer', 'real') THEN CAST(amount AS REAL) END";

const COLUMNS: &str = "id, work_order_id, \
    CASE WHEN typeof(amount) IN ('integer', 'real') THEN CAST(amount AS REAL) END AS amount, \
    status, due_date, notes";

// Item figures fall back to their column defaults when the stored value is
// not a number.
const ITEM_COLUMNS: &str = "id, invoice_id, description, \
    CASE WHEN typeof(qty) IN ('integer', 'real') THEN CAST(qty AS REAL) ELSE 1.0 END AS qty, \
    CASE WHEN typeof(unit_price) IN ('integer', 'real') THEN CAST(unit_price AS REAL) ELSE 0.0 END AS unit_price, \
    CASE WHEN typeof(tax_rate) IN ('integer', 'real') THEN CAST(tax_rate AS REAL) ELSE 0.0 END AS tax_rate, \
    CASE WHEN typeof(line_total) IN ('integer', 'real') THEN CAST(line_total AS REAL) ELSE 0.0 END AS line_total";

/// Anything other than `Paid` is outstanding.
pub fn normalize_status(status: &str) -> &'static str {
    if status.trim().eq_ignore_ascii_case(STATUS_PAID) {
        STATUS_PAID
    } else {
        STATUS_OUTSTANDING
    }
}

/// `qty * unit_price` rounded to cents. Tax is reported beside the line, not
/// folded into it.
pub fn line_total(qty: f64, unit_price: f64) -> f64 {
    (qty * unit_price * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub work_order_id: Option<i64>,
    pub amount: Option<f64>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

impl Invoice {
    pub fn is_paid(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(STATUS_PAID))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceInput {
    pub work_order_id: Option<i64>,
    pub amount: Option<f64>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub description: Option<String>,
    pub qty: f64,
    pub unit_price: f64,
    pub tax_rate: f64,
    pub line_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItemInput {
    pub description: Option<String>,
    pub qty: f64,
    pub unit_price: f64,
    pub tax_rate: f64,
}

impl Default for InvoiceItemInput {
    fn default() -> Self {
        Self {
            description: None,
            qty: 1.0,
            unit_price: 0.0,
            tax_rate: 0.0,
        }
    }
}

/// Invoices by id, optionally only those with the given status.
pub async fn list(pool: &SqlitePool, status: Option<&str>) -> AppResult<Vec<Invoice>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, Invoice>(&format!(
                "SELECT {COLUMNS} FROM invoices WHERE status LIKE ? ORDER BY id"
            ))
            .bind(normalize_status(status))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Invoice>(&format!("SELECT {COLUMNS} FROM invoices ORDER BY id"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn find(pool: &SqlitePool, id: i64) -> AppResult<Option<Invoice>> {
    Ok(
        sqlx::query_as::<_, Invoice>(&format!("SELECT {COLUMNS} FROM invoices WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Invoice> {
    find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("invoice", id))
}

pub async fn create(pool: &SqlitePool, input: &InvoiceInput) -> AppResult<Invoice> {
    let status = normalize_status(input.status.as_deref().unwrap_or(""));
    let res = sqlx::query(
        "INSERT INTO invoices (work_order_id, amount, status, due_date, notes)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(input.work_order_id)
    .bind(input.amount.unwrap_or(0.0))
    .bind(status)
    .bind(&input.due_date)
    .bind(&input.notes)
    .execute(pool)
    .await?;
    get(pool, res.last_insert_rowid()).await
}

pub async fn update(pool: &SqlitePool, id: i64, input: &InvoiceInput) -> AppResult<Invoice> {
    let status = normalize_status(input.status.as_deref().unwrap_or(""));
    let res = sqlx::query(
        "UPDATE invoices
         SET work_order_id = ?, amount = ?, status = ?, due_date = ?, notes = ?
         WHERE id = ?",
    )
    .bind(input.work_order_id)
    .bind(input.amount)
    .bind(status)
    .bind(&input.due_date)
    .bind(&input.notes)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("invoice", id));
    }
    get(pool, id).await
}

pub async fn set_status(pool: &SqlitePool, id: i64, status: &str) -> AppResult<Invoice> {
    let res = sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
        .bind(normalize_status(status))
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("invoice", id));
    }
    get(pool, id).await
}

/// Deleting an invoice deletes its line items.
pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
    delete_by_id(pool, "invoices", "invoice", id).await
}

pub async fn items(pool: &SqlitePool, invoice_id: i64) -> AppResult<Vec<InvoiceItem>> {
    Ok(sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = ? ORDER BY id"
    ))
    .bind(invoice_id)
    .fetch_all(pool)
    .await?)
}

async fn recompute_total(tx: &mut Transaction<'static, Sqlite>, invoice_id: i64) -> AppResult<f64> {
    let total: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(line_total), 0.0) FROM invoice_items WHERE invoice_id = ?",
    )
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;
    sqlx::query("UPDATE invoices SET amount = ? WHERE id = ?")
        .bind(total)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;
    debug!(target: "repairdesk", event = "invoice_total_recomputed", invoice_id, total);
    Ok(total)
}

async fn fetch_item(tx: &mut Transaction<'static, Sqlite>, item_id: i64) -> AppResult<InvoiceItem> {
    sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE id = ?"
    ))
    .bind(item_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::not_found("invoice item", item_id))
}

/// Add a line and bring the invoice amount back in line with its items.
pub async fn add_item(
    pool: &SqlitePool,
    invoice_id: i64,
    input: &InvoiceItemInput,
) -> AppResult<InvoiceItem> {
    let mut tx = pool.begin().await?;
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM invoices WHERE id = ?")
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::not_found("invoice", invoice_id));
    }

    let res = sqlx::query(
        "INSERT INTO invoice_items (invoice_id, description, qty, unit_price, tax_rate, line_total)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice_id)
    .bind(&input.description)
    .bind(input.qty)
    .bind(input.unit_price)
    .bind(input.tax_rate)
    .bind(line_total(input.qty, input.unit_price))
    .execute(&mut *tx)
    .await?;
    let item = fetch_item(&mut tx, res.last_insert_rowid()).await?;
    recompute_total(&mut tx, invoice_id).await?;
    tx.commit().await?;
    Ok(item)
}

pub async fn update_item(
    pool: &SqlitePool,
    item_id: i64,
    input: &InvoiceItemInput,
) -> AppResult<InvoiceItem> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        "UPDATE invoice_items
         SET description = ?, qty = ?, unit_price = ?, tax_rate = ?, line_total = ?
         WHERE id = ?",
    )
    .bind(&input.description)
    .bind(input.qty)
    .bind(input.unit_price)
    .bind(input.tax_rate)
    .bind(line_total(input.qty, input.unit_price))
    .bind(item_id)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("invoice item", item_id));
    }
    let item = fetch_item(&mut tx, item_id).await?;
    recompute_total(&mut tx, item.invoice_id).await?;
    tx.commit().await?;
    Ok(item)
}

pub async fn delete_item(pool: &SqlitePool, item_id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let item = fetch_item(&mut tx, item_id).await?;
    sqlx::query("DELETE FROM invoice_items WHERE id = ?")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    recompute_total(&mut tx, item.invoice_id).await?;
    tx.commit().await?;
    Ok(())
}
