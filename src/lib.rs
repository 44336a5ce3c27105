use tracing::info;

pub mod business_info;
pub mod capabilities;
pub mod config;
pub mod customers;
pub mod dashboard;
pub mod db;
pub mod documents;
pub mod equipment;
mod error;
pub mod export;
pub mod import;
pub mod invoices;
pub mod logging;
pub mod migrate;
pub mod repo;
pub mod time;
pub mod work_orders;

pub use capabilities::Capabilities;
pub use config::AppConfig;
pub use db::Store;
pub use error::{AppError, AppResult};

/// Bring the store up to date: snapshot the current file, open it and apply
/// any pending migrations.
///
/// A failed snapshot is logged and does not stop startup; a failed migration
/// step does.
pub async fn bootstrap(config: &AppConfig) -> AppResult<(Store, migrate::MigrationReport)> {
    db::backup::backup_and_prune(config, db::backup::BackupReason::PreMigration).await;

    let store = Store::open(&config.db_path).await?;
    let report = migrate::apply_migrations(store.pool()).await?;
    info!(
        target: "repairdesk",
        event = "bootstrap_complete",
        db = %config.db_path.display(),
        from_version = report.from_version,
        to_version = report.to_version,
    );
    Ok((store, report))
}
