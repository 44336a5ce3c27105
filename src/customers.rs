use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::repo::{delete_by_id, search_term};
use crate::{AppError, AppResult};

const COLUMNS: &str = "id, first_name, last_name, phone, email, address, notes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl Customer {
    /// "First Last", tolerating either part being missing.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// All customers by id; `search` matches any text column.
pub async fn list(pool: &SqlitePool, search: Option<&str>) -> AppResult<Vec<Customer>> {
    let rows = match search_term(search) {
        Some(pattern) => {
            sqlx::query_as::<_, Customer>(&format!(
                "SELECT {COLUMNS} FROM customers
                 WHERE first_name LIKE ?1 ESCAPE '\\' OR last_name LIKE ?1 ESCAPE '\\'
                    OR phone LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'
                    OR address LIKE ?1 ESCAPE '\\' OR notes LIKE ?1 ESCAPE '\\'
                 ORDER BY id"
            ))
            .bind(pattern)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Customer>(&format!("SELECT {COLUMNS} FROM customers ORDER BY id"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn find(pool: &SqlitePool, id: i64) -> AppResult<Option<Customer>> {
    Ok(
        sqlx::query_as::<_, Customer>(&format!("SELECT {COLUMNS} FROM customers WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Customer> {
    find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("customer", id))
}

pub async fn create(pool: &SqlitePool, input: &CustomerInput) -> AppResult<Customer> {
    let res = sqlx::query(
        "INSERT INTO customers (first_name, last_name, phone, email, address, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(&input.notes)
    .execute(pool)
    .await?;
    get(pool, res.last_insert_rowid()).await
}

pub async fn update(pool: &SqlitePool, id: i64, input: &CustomerInput) -> AppResult<Customer> {
    let res = sqlx::query(
        "UPDATE customers
         SET first_name = ?, last_name = ?, phone = ?, email = ?, address = ?, notes = ?
         WHERE id = ?",
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(&input.notes)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("customer", id));
    }
    get(pool, id).await
}

/// Remove a customer along with their equipment, work orders and, through
/// those, invoices.
pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
    delete_by_id(pool, "customers", "customer", id).await
}
