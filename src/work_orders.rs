use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::repo::{delete_by_id, search_term};
use crate::{time, AppError, AppResult};

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUSES: &[&str] = &[STATUS_PENDING, STATUS_IN_PROGRESS, STATUS_COMPLETED];

const COLUMNS: &str =
    "id, customer_id, equipment_id, description, status, date_created, date_completed, due_date";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkOrder {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub date_created: Option<String>,
    pub date_completed: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderInput {
    pub customer_id: Option<i64>,
    pub equipment_id: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub date_created: Option<String>,
    pub date_completed: Option<String>,
    pub due_date: Option<String>,
}

pub async fn list(pool: &SqlitePool, search: Option<&str>) -> AppResult<Vec<WorkOrder>> {
    let rows = match search_term(search) {
        Some(pattern) => {
            sqlx::query_as::<_, WorkOrder>(&format!(
                "SELECT {COLUMNS} FROM work_orders
                 WHERE description LIKE ?1 ESCAPE '\\' OR status LIKE ?1 ESCAPE '\\'
                 ORDER BY id"
            ))
            .bind(pattern)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, WorkOrder>(&format!("SELECT {COLUMNS} FROM work_orders ORDER BY id"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn list_for_customer(pool: &SqlitePool, customer_id: i64) -> AppResult<Vec<WorkOrder>> {
    Ok(sqlx::query_as::<_, WorkOrder>(&format!(
        "SELECT {COLUMNS} FROM work_orders WHERE customer_id = ? ORDER BY id"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await?)
}

pub async fn find(pool: &SqlitePool, id: i64) -> AppResult<Option<WorkOrder>> {
    Ok(
        sqlx::query_as::<_, WorkOrder>(&format!("SELECT {COLUMNS} FROM work_orders WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<WorkOrder> {
    find(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("work order", id))
}

/// New work orders start `Pending` and are dated today unless told otherwise.
pub async fn create(pool: &SqlitePool, input: &WorkOrderInput) -> AppResult<WorkOrder> {
    let status = input
        .status
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| STATUS_PENDING.to_string());
    let date_created = input
        .date_created
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(time::today_iso);

    let res = sqlx::query(
        "INSERT INTO work_orders
           (customer_id, equipment_id, description, status, date_created, date_completed, due_date)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.customer_id)
    .bind(input.equipment_id)
    .bind(&input.description)
    .bind(status)
    .bind(date_created)
    .bind(&input.date_completed)
    .bind(&input.due_date)
    .execute(pool)
    .await?;
    get(pool, res.last_insert_rowid()).await
}

pub async fn update(pool: &SqlitePool, id: i64, input: &WorkOrderInput) -> AppResult<WorkOrder> {
    let res = sqlx::query(
        "UPDATE work_orders
         SET customer_id = ?, equipment_id = ?, description = ?, status = ?,
             date_created = ?, date_completed = ?, due_date = ?
         WHERE id = ?",
    )
    .bind(input.customer_id)
    .bind(input.equipment_id)
    .bind(&input.description)
    .bind(&input.status)
    .bind(&input.date_created)
    .bind(&input.date_completed)
    .bind(&input.due_date)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("work order", id));
    }
    get(pool, id).await
}

/// Set the status; moving to `Completed` stamps today's date if none is set.
pub async fn set_status(pool: &SqlitePool, id: i64, status: &str) -> AppResult<WorkOrder> {
    let res = sqlx::query(
        "UPDATE work_orders
         SET status = ?1,
             date_completed = CASE
               WHEN ?1 = 'Completed' AND (date_completed IS NULL OR date_completed = '') THEN ?2
               ELSE date_completed
             END
         WHERE id = ?3",
    )
    .bind(status)
    .bind(time::today_iso())
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("work order", id));
    }
    get(pool, id).await
}

/// Deleting a work order deletes its invoices.
pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
    delete_by_id(pool, "work_orders", "work order", id).await
}
