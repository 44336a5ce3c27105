mod util;

use anyhow::Result;
use repairdesk_lib::migrate::{self, apply_migrations, apply_steps, MigrationStep, MIGRATIONS};
use repairdesk_lib::{customers, equipment, Store};
use sqlx::SqlitePool;
use tempfile::tempdir;

async fn object_exists(pool: &SqlitePool, kind: &str, name: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2")
            .bind(kind)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn version(pool: &SqlitePool) -> Result<i64> {
    Ok(migrate::current_version(pool).await?)
}

#[tokio::test]
async fn migrate_from_zero_reaches_latest() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(&dir.path().join("fresh.sqlite3")).await?;

    let report = apply_migrations(store.pool()).await?;
    assert_eq!(report.from_version, 0);
    assert_eq!(report.to_version, MIGRATIONS.len() as i64);
    assert_eq!(report.applied.len(), MIGRATIONS.len());
    assert_eq!(version(store.pool()).await?, MIGRATIONS.len() as i64);

    for table in [
        "customers",
        "equipment",
        "work_orders",
        "invoices",
        "invoice_items",
        "business_info",
    ] {
        assert!(object_exists(store.pool(), "table", table).await?, "missing table {table}");
    }
    assert!(object_exists(store.pool(), "index", "invoices_due_idx").await?);

    let markers = util::count(store.pool(), "schema_version").await?;
    assert_eq!(markers, 1, "version marker must be a single row");
    util::assert_fk_clean(store.pool()).await?;
    let integrity: String = sqlx::query_scalar("PRAGMA integrity_check;")
        .fetch_one(store.pool())
        .await?;
    assert_eq!(integrity, "ok");
    store.close().await;
    Ok(())
}

#[tokio::test]
async fn rerun_at_latest_changes_nothing() -> Result<()> {
    let store = util::memory_store().await?;
    let before: i64 = sqlx::query_scalar("SELECT total_changes()")
        .fetch_one(store.pool())
        .await?;

    let report = apply_migrations(store.pool()).await?;
    assert!(report.applied.is_empty());

    let after: i64 = sqlx::query_scalar("SELECT total_changes()")
        .fetch_one(store.pool())
        .await?;
    assert_eq!(before, after, "second run must not mutate the store");
    Ok(())
}

const LEGACY_SCHEMA: &[&str] = &[
    "CREATE TABLE customers (id INTEGER PRIMARY KEY AUTOINCREMENT,
       first_name TEXT, last_name TEXT, phone TEXT, email TEXT, address TEXT, notes TEXT)",
    "CREATE TABLE equipment (id INTEGER PRIMARY KEY AUTOINCREMENT, customer_id INTEGER,
       serial_number TEXT, cpu TEXT, ram TEXT, storage TEXT, os TEXT,
       FOREIGN KEY(customer_id) REFERENCES customers(id))",
    "CREATE TABLE work_orders (id INTEGER PRIMARY KEY AUTOINCREMENT,
       customer_id INTEGER, equipment_id INTEGER, description TEXT,
       FOREIGN KEY(customer_id) REFERENCES customers(id),
       FOREIGN KEY(equipment_id) REFERENCES equipment(id))",
    "CREATE TABLE invoices (id INTEGER PRIMARY KEY AUTOINCREMENT, work_order_id INTEGER,
       status TEXT, FOREIGN KEY(work_order_id) REFERENCES work_orders(id))",
    "CREATE TABLE business_info (id INTEGER PRIMARY KEY CHECK (id = 1),
       name TEXT, address TEXT, phone TEXT, email TEXT)",
    "INSERT INTO business_info (id, name) VALUES (1, 'Old Shop')",
    "INSERT INTO customers (first_name) VALUES ('Legacy')",
    "INSERT INTO equipment (customer_id, serial_number) VALUES (1, 'SN-1')",
    "INSERT INTO work_orders (customer_id, equipment_id, description) VALUES (1, 1, 'Fan noise')",
    "INSERT INTO invoices (work_order_id, status) VALUES (1, 'Outstanding')",
];

async fn legacy_store() -> Result<Store> {
    let store = Store::open_in_memory().await?;
    for sql in LEGACY_SCHEMA {
        sqlx::query(sql).execute(store.pool()).await?;
    }
    Ok(store)
}

#[tokio::test]
async fn legacy_store_gains_missing_columns() -> Result<()> {
    let store = legacy_store().await?;
    let pool = store.pool();

    apply_migrations(pool).await?;
    assert_eq!(version(pool).await?, MIGRATIONS.len() as i64);

    let wo_cols = util::column_names(pool, "work_orders").await?;
    for col in ["status", "date_created", "date_completed", "due_date"] {
        assert!(wo_cols.iter().any(|c| c == col), "work_orders.{col} missing");
    }
    let inv_cols = util::column_names(pool, "invoices").await?;
    for col in ["amount", "notes", "due_date"] {
        assert!(inv_cols.iter().any(|c| c == col), "invoices.{col} missing");
    }
    let eq_cols = util::column_names(pool, "equipment").await?;
    assert!(eq_cols.iter().any(|c| c == "notes"), "equipment.notes missing");

    let name: String = sqlx::query_scalar("SELECT first_name FROM customers WHERE id = 1")
        .fetch_one(pool)
        .await?;
    assert_eq!(name, "Legacy");
    let description: String = sqlx::query_scalar("SELECT description FROM work_orders WHERE id = 1")
        .fetch_one(pool)
        .await?;
    assert_eq!(description, "Fan noise");

    let (shop, site): (String, Option<String>) =
        sqlx::query_as("SELECT name, website FROM business_info WHERE id = 1")
            .fetch_one(pool)
            .await?;
    assert_eq!(shop, "Old Shop");
    assert_eq!(site.as_deref(), Some("https://example.com"));
    util::assert_fk_clean(pool).await?;
    Ok(())
}

#[tokio::test]
async fn legacy_plain_references_gain_delete_actions() -> Result<()> {
    let store = legacy_store().await?;
    let pool = store.pool();
    apply_migrations(pool).await?;

    equipment::delete(pool, 1).await?;
    let equipment_id: Option<i64> =
        sqlx::query_scalar("SELECT equipment_id FROM work_orders WHERE id = 1")
            .fetch_one(pool)
            .await?;
    assert_eq!(equipment_id, None, "work order keeps its history without equipment");

    customers::delete(pool, 1).await?;
    for table in ["customers", "equipment", "work_orders", "invoices"] {
        assert_eq!(util::count(pool, table).await?, 0, "{table} not emptied");
    }
    util::assert_fk_clean(pool).await?;
    Ok(())
}

#[tokio::test]
async fn store_left_at_last_legacy_version_is_upgraded() -> Result<()> {
    let store = legacy_store().await?;
    let pool = store.pool();
    for sql in [
        "ALTER TABLE equipment ADD COLUMN notes TEXT",
        "ALTER TABLE work_orders ADD COLUMN status TEXT",
        "ALTER TABLE work_orders ADD COLUMN date_created TEXT",
        "ALTER TABLE work_orders ADD COLUMN date_completed TEXT",
        "ALTER TABLE work_orders ADD COLUMN due_date TEXT",
        "ALTER TABLE invoices ADD COLUMN amount REAL",
        "ALTER TABLE invoices ADD COLUMN due_date TEXT",
        "ALTER TABLE invoices ADD COLUMN notes TEXT",
        "ALTER TABLE business_info ADD COLUMN website TEXT",
        "CREATE TABLE schema_version (version INTEGER NOT NULL)",
        "INSERT INTO schema_version (version) VALUES (6)",
    ] {
        sqlx::query(sql).execute(pool).await?;
    }

    let report = apply_migrations(pool).await?;
    assert_eq!(report.from_version, 6);
    assert_eq!(
        report.applied,
        vec!["0006_invoice_items", "0007_deadline_indexes", "0008_foreign_key_actions"]
    );
    assert!(object_exists(pool, "index", "work_orders_customer_idx").await?);

    customers::delete(pool, 1).await?;
    assert_eq!(util::count(pool, "invoices").await?, 0);
    util::assert_fk_clean(pool).await?;
    Ok(())
}

#[tokio::test]
async fn failing_step_stops_at_its_index() -> Result<()> {
    let store = Store::open_in_memory().await?;
    let pool = store.pool();
    let broken = [
        MigrationStep::sql("create_a", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
        MigrationStep::sql(
            "half_then_fail",
            "CREATE TABLE b (id INTEGER PRIMARY KEY); INSERT INTO missing_table VALUES (1);",
        ),
        MigrationStep::sql("create_c", "CREATE TABLE c (id INTEGER PRIMARY KEY);"),
    ];

    let err = apply_steps(pool, &broken).await.unwrap_err();
    assert_eq!(err.code(), "MIGRATION/STEP_FAILED");
    assert_eq!(err.context().get("index").map(String::as_str), Some("1"));
    assert_eq!(version(pool).await?, 1);
    assert!(object_exists(pool, "table", "a").await?);
    assert!(!object_exists(pool, "table", "b").await?, "failed step left partial DDL");
    assert!(!object_exists(pool, "table", "c").await?, "later step ran");

    let fixed = [
        broken[0],
        MigrationStep::sql("half_then_fail", "CREATE TABLE b (id INTEGER PRIMARY KEY);"),
        broken[2],
    ];
    let report = apply_steps(pool, &fixed).await?;
    assert_eq!(report.from_version, 1);
    assert_eq!(report.applied, vec!["half_then_fail", "create_c"]);
    assert_eq!(version(pool).await?, 3);
    Ok(())
}

#[tokio::test]
async fn stored_version_ahead_is_left_alone() -> Result<()> {
    let store = util::memory_store().await?;
    sqlx::query("UPDATE schema_version SET version = 99")
        .execute(store.pool())
        .await?;

    let report = apply_migrations(store.pool()).await?;
    assert!(report.applied.is_empty());
    assert_eq!(version(store.pool()).await?, 99);

    let status = migrate::status(store.pool()).await?;
    assert!(status.pending.is_empty());
    Ok(())
}

#[tokio::test]
async fn negative_stored_version_starts_from_zero() -> Result<()> {
    let store = Store::open_in_memory().await?;
    sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
        .execute(store.pool())
        .await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (-3)")
        .execute(store.pool())
        .await?;

    let report = apply_migrations(store.pool()).await?;
    assert_eq!(report.from_version, 0);
    assert_eq!(report.applied.len(), MIGRATIONS.len());
    assert_eq!(version(store.pool()).await?, MIGRATIONS.len() as i64);
    assert!(object_exists(store.pool(), "table", "invoice_items").await?);
    Ok(())
}
