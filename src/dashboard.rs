use serde::Serialize;
use sqlx::SqlitePool;

use crate::invoices::AMOUNT_SQL;
use crate::repo::count;
use crate::{time, AppResult};

const DEADLINE_LIMIT: i64 = 5;
const UNKNOWN_STATUS: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub customers: i64,
    pub equipment: i64,
    pub work_orders: i64,
    pub pending_work_orders: i64,
    pub invoices: i64,
    pub invoices_total: f64,
    pub outstanding: i64,
    pub outstanding_total: f64,
    pub paid: i64,
    pub paid_total: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderDeadline {
    pub id: i64,
    pub due_date: String,
    pub description: Option<String>,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDeadline {
    pub id: i64,
    pub due_date: String,
    pub status: Option<String>,
    pub amount: f64,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deadlines {
    pub work_orders: Vec<WorkOrderDeadline>,
    pub invoices: Vec<InvoiceDeadline>,
}

async fn count_and_sum(pool: &SqlitePool, filter: &str) -> AppResult<(i64, f64)> {
    let sql = format!(
        "SELECT COUNT(*), CAST(COALESCE(SUM({AMOUNT_SQL}), 0) AS REAL) FROM invoices {filter}"
    );
    Ok(sqlx::query_as::<_, (i64, f64)>(&sql).fetch_one(pool).await?)
}

pub async fn summary(pool: &SqlitePool) -> AppResult<Summary> {
    let pending_work_orders: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM work_orders
         WHERE status LIKE 'Pending' OR status = '' OR status IS NULL",
    )
    .fetch_one(pool)
    .await?;
    let (invoices, invoices_total) = count_and_sum(pool, "").await?;
    let (outstanding, outstanding_total) =
        count_and_sum(pool, "WHERE status LIKE 'Outstanding'").await?;
    let (paid, paid_total) = count_and_sum(pool, "WHERE status LIKE 'Paid'").await?;

    Ok(Summary {
        customers: count(pool, "customers").await?,
        equipment: count(pool, "equipment").await?,
        work_orders: count(pool, "work_orders").await?,
        pending_work_orders,
        invoices,
        invoices_total,
        outstanding,
        outstanding_total,
        paid,
        paid_total,
    })
}

async fn status_counts(pool: &SqlitePool, table: &str) -> AppResult<Vec<StatusCount>> {
    let sql = format!("SELECT status, COUNT(*) FROM {table} GROUP BY status ORDER BY status");
    let rows = sqlx::query_as::<_, (Option<String>, i64)>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
            count,
        })
        .collect())
}

pub async fn work_order_status_counts(pool: &SqlitePool) -> AppResult<Vec<StatusCount>> {
    status_counts(pool, "work_orders").await
}

pub async fn invoice_status_counts(pool: &SqlitePool) -> AppResult<Vec<StatusCount>> {
    status_counts(pool, "invoices").await
}

/// The earliest dated work orders and invoices relative to `today`
/// (`YYYY-MM-DD`). Paid invoices are never overdue.
pub async fn upcoming_deadlines_on(pool: &SqlitePool, today: &str) -> AppResult<Deadlines> {
    let wos = sqlx::query_as::<_, (i64, String, Option<String>)>(
        "SELECT id, due_date, description FROM work_orders
         WHERE due_date IS NOT NULL AND due_date <> ''
         ORDER BY due_date ASC LIMIT ?",
    )
    .bind(DEADLINE_LIMIT)
    .fetch_all(pool)
    .await?;
    let invs = sqlx::query_as::<_, (i64, String, Option<String>, Option<f64>)>(&format!(
        "SELECT id, due_date, status, {AMOUNT_SQL} FROM invoices
         WHERE due_date IS NOT NULL AND due_date <> ''
         ORDER BY due_date ASC LIMIT ?"
    ))
    .bind(DEADLINE_LIMIT)
    .fetch_all(pool)
    .await?;

    let work_orders = wos
        .into_iter()
        .map(|(id, due_date, description)| WorkOrderDeadline {
            overdue: due_date.as_str() < today,
            id,
            due_date,
            description,
        })
        .collect();
    let invoices = invs
        .into_iter()
        .map(|(id, due_date, status, amount)| {
            let paid = status
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("paid"));
            InvoiceDeadline {
                overdue: due_date.as_str() < today && !paid,
                id,
                due_date,
                status,
                amount: amount.unwrap_or(0.0),
            }
        })
        .collect();

    Ok(Deadlines {
        work_orders,
        invoices,
    })
}

pub async fn upcoming_deadlines(pool: &SqlitePool) -> AppResult<Deadlines> {
    upcoming_deadlines_on(pool, &time::today_iso()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::invoices::{self, InvoiceInput};
    use crate::migrate::apply_migrations;
    use crate::work_orders::{self, WorkOrderInput};

    async fn store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        apply_migrations(store.pool()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_summary_is_zero() {
        let store = store().await;
        assert_eq!(summary(store.pool()).await.unwrap(), Summary::default());
    }

    #[tokio::test]
    async fn summary_counts_and_totals() {
        let store = store().await;
        for status in [Some("Pending"), None, Some("Completed")] {
            work_orders::create(
                store.pool(),
                &WorkOrderInput {
                    status: status.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        sqlx::query("UPDATE work_orders SET status = NULL WHERE id = 2")
            .execute(store.pool())
            .await
            .unwrap();
        for (amount, status) in [(100.0, "Outstanding"), (50.0, "Paid"), (25.5, "Paid")] {
            invoices::create(
                store.pool(),
                &InvoiceInput {
                    amount: Some(amount),
                    status: Some(status.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let s = summary(store.pool()).await.unwrap();
        assert_eq!(s.work_orders, 3);
        assert_eq!(s.pending_work_orders, 2);
        assert_eq!((s.invoices, s.invoices_total), (3, 175.5));
        assert_eq!((s.outstanding, s.outstanding_total), (1, 100.0));
        assert_eq!((s.paid, s.paid_total), (2, 75.5));

        let wo = work_order_status_counts(store.pool()).await.unwrap();
        assert!(wo.contains(&StatusCount { status: "Unknown".into(), count: 1 }));
        let inv = invoice_status_counts(store.pool()).await.unwrap();
        assert!(inv.contains(&StatusCount { status: "Paid".into(), count: 2 }));
    }

    #[tokio::test]
    async fn deadlines_flag_overdue_unpaid_only() {
        let store = store().await;
        for due in ["2024-03-01", "2024-01-01", ""] {
            work_orders::create(
                store.pool(),
                &WorkOrderInput {
                    due_date: Some(due.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        for (due, status) in [("2024-01-15", "Paid"), ("2024-01-20", "Outstanding")] {
            invoices::create(
                store.pool(),
                &InvoiceInput {
                    due_date: Some(due.into()),
                    status: Some(status.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let d = upcoming_deadlines_on(store.pool(), "2024-02-01").await.unwrap();
        let wo: Vec<_> = d.work_orders.iter().map(|w| (w.due_date.as_str(), w.overdue)).collect();
        assert_eq!(wo, vec![("2024-01-01", true), ("2024-03-01", false)]);
        let inv: Vec<_> = d.invoices.iter().map(|i| i.overdue).collect();
        assert_eq!(inv, vec![false, true]);
    }
}
