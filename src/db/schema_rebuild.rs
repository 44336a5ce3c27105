//! Rebuild child tables whose foreign keys lack their delete actions.
//!
//! Stores created by earlier releases declared plain `REFERENCES` clauses, so
//! deleting a parent with `foreign_keys` on fails instead of cascading. SQLite
//! cannot alter a constraint in place: the table is recreated from its current
//! definition plus any extra columns the old one had, rows are copied by column
//! name, the old table is dropped and the new one renamed over it. Indexes and triggers on the table are
//! recreated afterwards.
//!
//! The caller must run this inside a transaction on a connection with
//! `foreign_keys` off, otherwise dropping a parent table fires the very
//! actions being repaired.

use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::db::schema::{quote_ident, table_exists, TableSchema};
use crate::AppResult;

/// One foreign key a child table must carry.
#[derive(Debug, Clone, Copy)]
pub struct DeleteAction {
    pub column: &'static str,
    pub parent: &'static str,
    pub on_delete: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ChildTable {
    pub name: &'static str,
    /// Column definitions for the rebuilt table, in the current shape.
    pub columns: &'static str,
    pub actions: &'static [DeleteAction],
}

/// Children in dependency order: a parent is rebuilt before its children.
pub static CHILD_TABLES: &[ChildTable] = &[
    ChildTable {
        name: "equipment",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
            serial_number TEXT,
            cpu TEXT,
            ram TEXT,
            storage TEXT,
            os TEXT,
            notes TEXT",
        actions: &[DeleteAction {
            column: "customer_id",
            parent: "customers",
            on_delete: "CASCADE",
        }],
    },
    ChildTable {
        name: "work_orders",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
            equipment_id INTEGER REFERENCES equipment(id) ON DELETE SET NULL,
            description TEXT,
            status TEXT,
            date_created TEXT,
            date_completed TEXT,
            due_date TEXT",
        actions: &[
            DeleteAction {
                column: "customer_id",
                parent: "customers",
                on_delete: "CASCADE",
            },
            DeleteAction {
                column: "equipment_id",
                parent: "equipment",
                on_delete: "SET NULL",
            },
        ],
    },
    ChildTable {
        name: "invoices",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
            work_order_id INTEGER REFERENCES work_orders(id) ON DELETE CASCADE,
            amount REAL,
            status TEXT,
            due_date TEXT,
            notes TEXT",
        actions: &[DeleteAction {
            column: "work_order_id",
            parent: "work_orders",
            on_delete: "CASCADE",
        }],
    },
    ChildTable {
        name: "invoice_items",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
            description TEXT,
            qty REAL NOT NULL DEFAULT 1,
            unit_price REAL NOT NULL DEFAULT 0.0,
            tax_rate REAL NOT NULL DEFAULT 0.0,
            line_total REAL NOT NULL DEFAULT 0.0",
        actions: &[DeleteAction {
            column: "invoice_id",
            parent: "invoices",
            on_delete: "CASCADE",
        }],
    },
];

/// Whether every expected foreign key of `child` is declared with its action.
pub async fn has_delete_actions(conn: &mut SqliteConnection, child: &ChildTable) -> AppResult<bool> {
    let declared = sqlx::query_as::<_, (String, String, String)>(
        "SELECT \"from\", \"table\", on_delete FROM pragma_foreign_key_list(?1)",
    )
    .bind(child.name)
    .fetch_all(&mut *conn)
    .await?;
    Ok(child.actions.iter().all(|want| {
        declared.iter().any(|(from, parent, on_delete)| {
            from == want.column
                && parent.eq_ignore_ascii_case(want.parent)
                && on_delete.eq_ignore_ascii_case(want.on_delete)
        })
    }))
}

/// Rebuild every child table missing a delete action. Returns the names of
/// the tables rebuilt.
pub async fn rebuild_missing_delete_actions(
    conn: &mut SqliteConnection,
) -> AppResult<Vec<&'static str>> {
    let mut rebuilt = Vec::new();
    for child in CHILD_TABLES {
        if !table_exists(&mut *conn, child.name).await? {
            continue;
        }
        if has_delete_actions(conn, child).await? {
            continue;
        }
        rebuild_table(conn, child).await?;
        rebuilt.push(child.name);
    }

    if !rebuilt.is_empty() {
        let violations = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&mut *conn)
            .await?
            .len();
        if violations > 0 {
            warn!(
                target: "repairdesk",
                event = "schema_rebuild_orphans",
                violations,
                "rows reference parents that no longer exist"
            );
        }
    }
    Ok(rebuilt)
}

async fn rebuild_table(conn: &mut SqliteConnection, child: &ChildTable) -> AppResult<()> {
    let table = quote_ident(child.name);
    let staging_name = format!("{}_rebuild", child.name);
    let staging = quote_ident(&staging_name);

    let dependents: Vec<String> = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master
         WHERE type IN ('index', 'trigger') AND tbl_name = ?1 AND sql IS NOT NULL",
    )
    .bind(child.name)
    .fetch_all(&mut *conn)
    .await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {staging}"))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!("CREATE TABLE {staging} ({})", child.columns))
        .execute(&mut *conn)
        .await?;
    // The staging table is AUTOINCREMENT, so sqlite_sequence exists from here.
    let sequence: Option<i64> =
        sqlx::query_scalar("SELECT seq FROM sqlite_sequence WHERE name = ?1")
            .bind(child.name)
            .fetch_optional(&mut *conn)
            .await?;

    let old = TableSchema::load_with(&mut *conn, child.name).await?;
    let new = TableSchema::load_with(&mut *conn, &staging_name).await?;
    // Columns outside the known shape are carried over as declared.
    for extra in old.columns.iter().filter(|c| new.column(&c.name).is_none()) {
        sqlx::query(&format!(
            "ALTER TABLE {staging} ADD COLUMN {} {}",
            quote_ident(&extra.name),
            extra.declared_type
        ))
        .execute(&mut *conn)
        .await?;
    }

    let list = old
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let copied = sqlx::query(&format!(
        "INSERT INTO {staging} ({list}) SELECT {list} FROM {table}"
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query(&format!("DROP TABLE {table}"))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!("ALTER TABLE {staging} RENAME TO {table}"))
        .execute(&mut *conn)
        .await?;

    if let Some(seq) = sequence {
        let updated = sqlx::query("UPDATE sqlite_sequence SET seq = MAX(seq, ?2) WHERE name = ?1")
            .bind(child.name)
            .bind(seq)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if updated == 0 {
            sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)")
                .bind(child.name)
                .bind(seq)
                .execute(&mut *conn)
                .await?;
        }
    }

    for sql in &dependents {
        sqlx::query(sql).execute(&mut *conn).await?;
    }

    info!(
        target: "repairdesk",
        event = "schema_table_rebuilt",
        table = child.name,
        rows = copied,
        recreated = dependents.len()
    );
    Ok(())
}
