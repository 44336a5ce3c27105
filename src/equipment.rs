use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::repo::{delete_by_id, search_term};
use crate::{AppError, AppResult};

const COLUMNS: &str = "id, customer_id, serial_number, cpu, ram, storage, os, notes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Equipment {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub serial_number: Option<String>,
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub os: Option<String>,
    pub notes: Option<String>,
}

impl Equipment {
    /// Labelled spec lines, in the order printed on documents.
    pub fn spec_lines(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Serial", self.serial_number.as_deref().unwrap_or("")),
            ("CPU", self.cpu.as_deref().unwrap_or("")),
            ("RAM", self.ram.as_deref().unwrap_or("")),
            ("Storage", self.storage.as_deref().unwrap_or("")),
            ("OS", self.os.as_deref().unwrap_or("")),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentInput {
    pub customer_id: Option<i64>,
    pub serial_number: Option<String>,
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub os: Option<String>,
    pub notes: Option<String>,
}

pub async fn list(pool: &SqlitePool, search: Option<&str>) -> AppResult<Vec<Equipment>> {
    let rows = match search_term(search) {
        Some(pattern) => {
            sqlx::query_as::<_, Equipment>(&format!(
                "SELECT {COLUMNS} FROM equipment
                 WHERE serial_number LIKE ?1 ESCAPE '\\' OR cpu LIKE ?1 ESCAPE '\\'
                    OR ram LIKE ?1 ESCAPE '\\' OR storage LIKE ?1 ESCAPE '\\'
                    OR os LIKE ?1 ESCAPE '\\' OR notes LIKE ?1 ESCAPE '\\'
                 ORDER BY id"
            ))
            .bind(pattern)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Equipment>(&format!("SELECT {COLUMNS} FROM equipment ORDER BY id"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn list_for_customer(pool: &SqlitePool, customer_id: i64) -> AppResult<Vec<Equipment>> {
    Ok(sqlx::query_as::<_, Equipment>(&format!(
        "SELECT {COLUMNS} FROM equipment WHERE customer_id = ? ORDER BY id"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await?)
}

pub async fn find(pool: &SqlitePool, id: i64) -> AppResult<Option<Equipment>> {
    Ok(
        sqlx::query_as::<_, Equipment>(&format!("SELECT {COLUMNS} FROM equipment WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Equipment> {
    find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("equipment", id))
}

pub async fn create(pool: &SqlitePool, input: &EquipmentInput) -> AppResult<Equipment> {
    let res = sqlx::query(
        "INSERT INTO equipment (customer_id, serial_number, cpu, ram, storage, os, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.customer_id)
    .bind(&input.serial_number)
    .bind(&input.cpu)
    .bind(&input.ram)
    .bind(&input.storage)
    .bind(&input.os)
    .bind(&input.notes)
    .execute(pool)
    .await?;
    get(pool, res.last_insert_rowid()).await
}

pub async fn update(pool: &SqlitePool, id: i64, input: &EquipmentInput) -> AppResult<Equipment> {
    let res = sqlx::query(
        "UPDATE equipment
         SET customer_id = ?, serial_number = ?, cpu = ?, ram = ?, storage = ?, os = ?, notes = ?
         WHERE id = ?",
    )
    .bind(input.customer_id)
    .bind(&input.serial_number)
    .bind(&input.cpu)
    .bind(&input.ram)
    .bind(&input.storage)
    .bind(&input.os)
    .bind(&input.notes)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("equipment", id));
    }
    get(pool, id).await
}

/// Work orders that referenced this equipment keep their history with the
/// link cleared.
pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
    delete_by_id(pool, "equipment", "equipment", id).await
}
