use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::{error, info, warn};

use crate::db::schema::{column_exists, table_exists};
use crate::db::schema_rebuild;
use crate::{AppError, AppResult};

pub const VERSION_TABLE: &str = "schema_version";

/// What a step runs.
#[derive(Debug, Clone, Copy)]
pub enum StepBody {
    Sql(&'static str),
    /// Rebuild child tables created without `ON DELETE` actions. Runs with
    /// `foreign_keys` off for the duration of the step.
    ForeignKeyActions,
}

/// One schema mutation at a fixed position in the ordered list.
///
/// Steps must be safe to run against a store that already has their target
/// structure: creates use `IF NOT EXISTS`, seeds use `INSERT OR IGNORE`, and
/// `ALTER TABLE .. ADD COLUMN` is skipped by the runner when the column is
/// already present.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub name: &'static str,
    pub body: StepBody,
}

impl MigrationStep {
    pub const fn sql(name: &'static str, sql: &'static str) -> Self {
        Self {
            name,
            body: StepBody::Sql(sql),
        }
    }
}

pub static MIGRATIONS: &[MigrationStep] = &[
    MigrationStep::sql(
        "0000_initial_schema",
        include_str!("../migrations/0000_initial_schema.sql"),
    ),
    MigrationStep::sql(
        "0001_business_info_website",
        include_str!("../migrations/0001_business_info_website.sql"),
    ),
    MigrationStep::sql(
        "0002_invoices_due_date",
        include_str!("../migrations/0002_invoices_due_date.sql"),
    ),
    MigrationStep::sql(
        "0003_equipment_notes",
        include_str!("../migrations/0003_equipment_notes.sql"),
    ),
    MigrationStep::sql(
        "0004_work_orders_status_dates",
        include_str!("../migrations/0004_work_orders_status_dates.sql"),
    ),
    MigrationStep::sql(
        "0005_invoices_amount_notes",
        include_str!("../migrations/0005_invoices_amount_notes.sql"),
    ),
    MigrationStep::sql(
        "0006_invoice_items",
        include_str!("../migrations/0006_invoice_items.sql"),
    ),
    MigrationStep::sql(
        "0007_deadline_indexes",
        include_str!("../migrations/0007_deadline_indexes.sql"),
    ),
    MigrationStep {
        name: "0008_foreign_key_actions",
        body: StepBody::ForeignKeyActions,
    },
];

static ADD_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+COLUMN\s+(\w+)").expect("valid regex")
});

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub current: i64,
    pub latest: i64,
    pub pending: Vec<&'static str>,
}

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let head: String = trimmed.chars().take(160).collect();
        format!("{head}…")
    } else {
        trimmed.to_string()
    }
}

/// Split a step into executable statements, dropping comment lines.
fn statements(sql: &str) -> Vec<String> {
    let cleaned = sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n");
    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let upper = s.to_ascii_uppercase();
            upper != "BEGIN" && upper != "COMMIT"
        })
        .map(str::to_string)
        .collect()
}

pub async fn apply_migrations(pool: &SqlitePool) -> AppResult<MigrationReport> {
    apply_steps(pool, MIGRATIONS).await
}

/// Bring the store up to `steps.len()`.
///
/// Each step runs in its own transaction together with the version bump, so
/// a step either lands whole with its marker or not at all. The first failing
/// step aborts the run and leaves the marker at that step's index.
pub async fn apply_steps(pool: &SqlitePool, steps: &[MigrationStep]) -> AppResult<MigrationReport> {
    ensure_version_marker(pool).await?;
    let stored = read_version(pool).await?;
    if stored < 0 {
        warn!(target: "repairdesk", event = "migration_version_negative", stored);
    }
    let from_version = stored.max(0);
    let latest = steps.len() as i64;

    if from_version >= latest {
        if from_version > latest {
            warn!(
                target: "repairdesk",
                event = "migration_version_ahead",
                stored = from_version,
                latest
            );
        } else {
            info!(target: "repairdesk", event = "migrations_up_to_date", version = from_version);
        }
        return Ok(MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        });
    }

    let mut applied = Vec::new();
    for (index, step) in steps.iter().enumerate().skip(from_version as usize) {
        let version = index as i64 + 1;
        if let Err(err) = apply_step(pool, step, version).await {
            error!(
                target: "repairdesk",
                event = "migration_step_failed",
                step = step.name,
                index,
                error = %err
            );
            return Err(AppError::new(
                "MIGRATION/STEP_FAILED",
                format!("Migration step {} failed", step.name),
            )
            .with_context("step", step.name)
            .with_context("index", index.to_string())
            .with_cause(err));
        }
        info!(
            target: "repairdesk",
            event = "migration_step_applied",
            step = step.name,
            version
        );
        applied.push(step.name);
    }

    Ok(MigrationReport {
        from_version,
        to_version: latest,
        applied,
    })
}

async fn apply_step(pool: &SqlitePool, step: &MigrationStep, version: i64) -> AppResult<()> {
    match step.body {
        StepBody::Sql(sql) => {
            let mut tx = pool.begin().await?;
            run_sql(&mut tx, step.name, sql).await?;
            set_version(&mut tx, version).await?;
            tx.commit().await?;
            Ok(())
        }
        StepBody::ForeignKeyActions => {
            let mut conn = pool.acquire().await?;
            sqlx::query("PRAGMA foreign_keys=OFF")
                .execute(&mut *conn)
                .await?;
            let result = rebuild_foreign_keys(&mut conn, step.name, version).await;
            let restored = sqlx::query("PRAGMA foreign_keys=ON")
                .execute(&mut *conn)
                .await;
            result?;
            restored?;
            Ok(())
        }
    }
}

async fn rebuild_foreign_keys(
    conn: &mut SqliteConnection,
    name: &'static str,
    version: i64,
) -> AppResult<()> {
    let mut tx = conn.begin().await?;
    let rebuilt = schema_rebuild::rebuild_missing_delete_actions(&mut tx).await?;
    set_version(&mut tx, version).await?;
    tx.commit().await?;
    if !rebuilt.is_empty() {
        info!(
            target: "repairdesk",
            event = "migration_tables_rebuilt",
            step = name,
            tables = %rebuilt.join(", ")
        );
    }
    Ok(())
}

async fn run_sql(conn: &mut SqliteConnection, name: &'static str, sql: &str) -> AppResult<()> {
    for stmt in statements(sql) {
        if let Some(caps) = ADD_COLUMN_RE.captures(&stmt) {
            let table = &caps[1];
            let column = &caps[2];
            if column_exists(&mut *conn, table, column).await? {
                info!(
                    target: "repairdesk",
                    event = "migration_stmt_skip",
                    step = name,
                    sql = %preview(&stmt)
                );
                continue;
            }
        }
        info!(
            target: "repairdesk",
            event = "migration_stmt",
            step = name,
            sql = %preview(&stmt)
        );
        sqlx::query(&stmt).execute(&mut *conn).await.map_err(|err| {
            AppError::from(err).with_context("sql", preview(&stmt))
        })?;
    }
    Ok(())
}

async fn set_version(conn: &mut SqliteConnection, version: i64) -> AppResult<()> {
    sqlx::query("UPDATE schema_version SET version = ?1")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn ensure_version_marker(pool: &SqlitePool) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    if !table_exists(&mut *tx, VERSION_TABLE).await? {
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&mut *tx)
            .await?;
    }
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&mut *tx)
        .await?;
    if rows == 0 {
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn read_version(pool: &SqlitePool) -> AppResult<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Stored schema version, or 0 when the marker has never been written.
pub async fn current_version(pool: &SqlitePool) -> AppResult<i64> {
    if !table_exists(pool, VERSION_TABLE).await? {
        return Ok(0);
    }
    read_version(pool).await
}

/// Read-only report of where the store stands against `MIGRATIONS`.
pub async fn status(pool: &SqlitePool) -> AppResult<MigrationStatus> {
    status_for(pool, MIGRATIONS).await
}

pub async fn status_for(pool: &SqlitePool, steps: &[MigrationStep]) -> AppResult<MigrationStatus> {
    let current = current_version(pool).await?;
    let pending = steps
        .iter()
        .skip(current.max(0) as usize)
        .map(|s| s.name)
        .collect();
    Ok(MigrationStatus {
        current,
        latest: steps.len() as i64,
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_drop_comments_and_blanks() {
        let sql = "-- header\nCREATE TABLE a (id INTEGER);\n\n  -- more\nCREATE TABLE b (id INTEGER);\n";
        let out = statements(sql);
        assert_eq!(out, vec!["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]);
    }

    #[test]
    fn add_column_pattern_captures_table_and_column() {
        let caps = ADD_COLUMN_RE
            .captures("alter table invoices  add column due_date TEXT")
            .unwrap();
        assert_eq!(&caps[1], "invoices");
        assert_eq!(&caps[2], "due_date");
        assert!(ADD_COLUMN_RE.captures("CREATE TABLE x (id)").is_none());
    }

    #[test]
    fn preview_truncates_long_sql() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).chars().count(), 161);
        assert_eq!(preview("SELECT\n1"), "SELECT 1");
    }

    #[test]
    fn migration_names_are_ordered_and_unique() {
        let names: Vec<_> = MIGRATIONS.iter().map(|s| s.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
