#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use anyhow::Result;
use repairdesk_lib::{migrate, AppConfig, Store};
use sqlx::SqlitePool;

/// Migrated single-connection in-memory store.
pub async fn memory_store() -> Result<Store> {
    let store = Store::open_in_memory().await?;
    migrate::apply_migrations(store.pool()).await?;
    Ok(store)
}

/// Migrated file store under `dir`, with its config pointing backups next to it.
pub async fn file_store(dir: &Path) -> Result<(Store, AppConfig)> {
    let config = AppConfig::for_db(dir.join("repairdesk.sqlite3"));
    let store = Store::open(&config.db_path).await?;
    migrate::apply_migrations(store.pool()).await?;
    Ok((store, config))
}

pub async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

pub async fn assert_fk_clean(pool: &SqlitePool) -> Result<()> {
    let fk_on: i64 = sqlx::query_scalar("PRAGMA foreign_keys;").fetch_one(pool).await?;
    assert_eq!(fk_on, 1, "PRAGMA foreign_keys must be ON");
    let violations = sqlx::query("PRAGMA foreign_key_check;").fetch_all(pool).await?;
    assert!(violations.is_empty(), "foreign_key_check reported violations");
    Ok(())
}

pub async fn column_names(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let sql = format!("SELECT name FROM pragma_table_info('{table}')");
    Ok(sqlx::query_scalar(&sql).fetch_all(pool).await?)
}
