use std::path::PathBuf;
use std::process;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use repairdesk_lib::db::backup::{self, BackupReason};
use repairdesk_lib::{
    customers, dashboard, documents, export, import, logging, migrate, AppConfig, Capabilities,
    Store,
};

#[derive(Debug, Parser)]
#[command(name = "repairdesk", about = "Repair shop records: customers, equipment, work orders, invoices", version)]
struct Cli {
    /// Database file. Defaults to REPAIRDESK_DB or the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Backup directory. Defaults to REPAIRDESK_BACKUP_DIR or `<db dir>/backups`.
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending schema migrations.
    Migrate {
        /// Only report the current and latest schema version.
        #[arg(long)]
        status: bool,
    },
    /// Write a manual snapshot of the database and prune expired ones.
    Backup,
    /// Merge a CSV, JSON or Excel file into a table.
    Import {
        table: String,
        file: PathBuf,
        /// Validate the header and show a preview without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a full table to CSV, JSON or Excel (chosen by extension).
    Export { table: String, file: PathBuf },
    /// Render PDF documents.
    #[command(subcommand)]
    Document(DocumentCommand),
    /// Dashboard counts, totals and upcoming deadlines.
    Stats {
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Customers(CustomersCommand),
    /// Show which optional features this build includes.
    Capabilities,
}

#[derive(Debug, Subcommand)]
enum DocumentCommand {
    Invoice { id: i64, out: PathBuf },
    WorkOrder { id: i64, out: PathBuf },
    /// One PDF per invoice into a directory.
    Invoices {
        dir: PathBuf,
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum CustomersCommand {
    List {
        #[arg(long)]
        search: Option<String>,
    },
    Delete { id: i64 },
}

fn main() {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.db.clone(), cli.backup_dir.clone());

    let _guard = match logging::init(config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging unavailable: {err:#}");
            None
        }
    };

    let caps = Capabilities::detect();
    for note in caps.disabled_notes() {
        tracing::info!(target: "repairdesk", event = "capability_disabled", note);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: start async runtime: {err}");
            process::exit(1);
        }
    };

    match runtime.block_on(handle_cli(cli.command, &config, caps)) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn handle_cli(command: Commands, config: &AppConfig, caps: Capabilities) -> Result<i32> {
    match command {
        Commands::Capabilities => {
            print_capabilities(caps);
            Ok(0)
        }
        Commands::Migrate { status: true } => {
            let store = Store::open(&config.db_path)
                .await
                .context("open database")?;
            let status = migrate::status(store.pool()).await.context("read schema version")?;
            store.close().await;
            println!("Schema version: {} (latest {})", status.current, status.latest);
            for name in &status.pending {
                println!("  pending: {name}");
            }
            Ok(0)
        }
        Commands::Backup => handle_backup(config).await,
        command => {
            let (store, report) = repairdesk_lib::bootstrap(config)
                .await
                .context("prepare database")?;
            let result = handle_store_command(command, &store, config, caps, &report).await;
            store.close().await;
            result
        }
    }
}

async fn handle_store_command(
    command: Commands,
    store: &Store,
    config: &AppConfig,
    caps: Capabilities,
    report: &migrate::MigrationReport,
) -> Result<i32> {
    match command {
        Commands::Migrate { .. } => {
            if report.applied.is_empty() {
                println!("No migrations needed (version {}).", report.to_version);
            } else {
                println!(
                    "Migrated from version {} to {}:",
                    report.from_version, report.to_version
                );
                for name in &report.applied {
                    println!("  applied: {name}");
                }
            }
        }
        Commands::Import {
            table,
            file,
            dry_run: true,
        } => {
            let preview = import::preview_file(store, caps, &table, &file)
                .await
                .with_context(|| format!("preview {}", file.display()))?;
            println!(
                "{} rows for {} ({:?}); columns: {}",
                preview.row_count,
                preview.table,
                preview.format,
                preview.header.join(", ")
            );
            for row in &preview.sample {
                println!("  {}", row.join(" | "));
            }
        }
        Commands::Import { table, file, .. } => {
            let summary = import::import_file(store, config, caps, &table, &file)
                .await
                .with_context(|| format!("import {}", file.display()))?;
            println!(
                "Imported into {table}: {} inserted, {} updated, {} skipped",
                summary.inserted, summary.updated, summary.skipped
            );
        }
        Commands::Export { table, file } => {
            let rows = export::export_table(store, caps, &table, &file)
                .await
                .with_context(|| format!("export {table}"))?;
            println!("Exported {rows} rows from {table} to {}", file.display());
        }
        Commands::Document(doc) => handle_document(doc, store, caps).await?,
        Commands::Stats { json } => print_stats(store, json).await?,
        Commands::Customers(CustomersCommand::List { search }) => {
            let rows = customers::list(store.pool(), search.as_deref())
                .await
                .context("list customers")?;
            for c in rows {
                println!(
                    "{:>5}  {:<30} {:<16} {}",
                    c.id,
                    c.display_name(),
                    c.phone.as_deref().unwrap_or(""),
                    c.email.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Customers(CustomersCommand::Delete { id }) => {
            customers::delete(store.pool(), id)
                .await
                .with_context(|| format!("delete customer {id}"))?;
            println!("Deleted customer {id} and its dependent records.");
        }
        Commands::Capabilities => print_capabilities(caps),
        Commands::Backup => return handle_backup(config).await,
    }
    Ok(0)
}

async fn handle_backup(config: &AppConfig) -> Result<i32> {
    let entry = backup::create_backup(&config.db_path, &config.backup_dir, BackupReason::Manual)
        .await
        .context("create backup")?;
    let pruned = backup::prune_expired(&config.backup_dir, config.retention_days, SystemTime::now())
        .context("prune expired backups")?;
    println!(
        "Backup written to {} ({} bytes); {} expired backup(s) removed.",
        entry.path.display(),
        entry.size_bytes,
        pruned.len()
    );
    Ok(0)
}

async fn handle_document(command: DocumentCommand, store: &Store, caps: Capabilities) -> Result<()> {
    match command {
        DocumentCommand::Invoice { id, out } => {
            let path = documents::render_invoice_pdf(store, caps, id, &pdf_path(out))
                .await
                .with_context(|| format!("render invoice {id}"))?;
            println!("Invoice saved to {}", path.display());
        }
        DocumentCommand::WorkOrder { id, out } => {
            let path = documents::render_work_order_pdf(store, caps, id, &pdf_path(out))
                .await
                .with_context(|| format!("render work order {id}"))?;
            println!("Work order saved to {}", path.display());
        }
        DocumentCommand::Invoices { dir, status } => {
            let written = documents::export_invoice_pdfs(store, caps, &dir, status.as_deref())
                .await
                .context("export invoice PDFs")?;
            println!("Wrote {} PDF(s) to {}", written.len(), dir.display());
        }
    }
    Ok(())
}

/// Append `.pdf` when the caller left it off.
fn pdf_path(out: PathBuf) -> PathBuf {
    let has_ext = out
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if has_ext {
        out
    } else {
        let mut raw = out.into_os_string();
        raw.push(".pdf");
        PathBuf::from(raw)
    }
}

fn print_capabilities(caps: Capabilities) {
    let label = |on: bool| if on { "enabled" } else { "disabled" };
    println!("excel: {}", label(caps.excel));
    println!("pdf:   {}", label(caps.pdf));
}

async fn print_stats(store: &Store, as_json: bool) -> Result<()> {
    let pool = store.pool();
    let summary = dashboard::summary(pool).await.context("summarise store")?;
    let wo_status = dashboard::work_order_status_counts(pool).await?;
    let inv_status = dashboard::invoice_status_counts(pool).await?;
    let deadlines = dashboard::upcoming_deadlines(pool).await?;

    if as_json {
        let payload = json!({
            "summary": summary,
            "work_order_status": wo_status,
            "invoice_status": inv_status,
            "deadlines": deadlines,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("serialize stats")?
        );
        return Ok(());
    }

    println!("Customers:    {}", summary.customers);
    println!("Equipment:    {}", summary.equipment);
    println!(
        "Work orders:  {} ({} pending)",
        summary.work_orders, summary.pending_work_orders
    );
    println!(
        "Invoices:     {} totalling ${:.2}",
        summary.invoices, summary.invoices_total
    );
    println!(
        "  outstanding {} (${:.2}), paid {} (${:.2})",
        summary.outstanding, summary.outstanding_total, summary.paid, summary.paid_total
    );
    if !deadlines.work_orders.is_empty() || !deadlines.invoices.is_empty() {
        println!("Upcoming deadlines:");
        for wo in &deadlines.work_orders {
            println!(
                "  WO #{:<5} {} {}{}",
                wo.id,
                wo.due_date,
                wo.description.as_deref().unwrap_or(""),
                overdue_marker(wo.overdue)
            );
        }
        for inv in &deadlines.invoices {
            println!(
                "  Inv #{:<4} {} ${:.2}{}",
                inv.id,
                inv.due_date,
                inv.amount,
                overdue_marker(inv.overdue)
            );
        }
    }
    Ok(())
}

fn overdue_marker(overdue: bool) -> &'static str {
    if overdue {
        "  [overdue]"
    } else {
        ""
    }
}
