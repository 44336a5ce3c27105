use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fs2::available_space;
use rusqlite::{backup::Backup, Connection, OpenFlags};
use serde::Serialize;
use tokio::task;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::{time, AppError, AppResult};

const BACKUP_EXTENSION: &str = "sqlite";
const PARTIAL_SUFFIX: &str = ".partial";
const REQUIRED_FREE_MULTIPLIER: f64 = 1.2;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Why a backup was taken; becomes the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupReason {
    PreMigration,
    Import,
    Manual,
}

impl BackupReason {
    pub fn prefix(self) -> &'static str {
        match self {
            BackupReason::PreMigration => "pre_migration",
            BackupReason::Import => "import",
            BackupReason::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub reason: BackupReason,
}

/// Copy the store at `db_path` into `backup_dir` as
/// `<prefix>_<YYYYmmdd_HHMMSS>.sqlite`.
pub async fn create_backup(
    db_path: &Path,
    backup_dir: &Path,
    reason: BackupReason,
) -> AppResult<BackupEntry> {
    let db_path = db_path.to_path_buf();
    let backup_dir = backup_dir.to_path_buf();
    task::spawn_blocking(move || create_backup_sync(&db_path, &backup_dir, reason))
        .await
        .map_err(|err| {
            AppError::new("DB_BACKUP/TASK", "Backup task panicked")
                .with_context("error", err.to_string())
        })?
}

pub fn create_backup_sync(
    db_path: &Path,
    backup_dir: &Path,
    reason: BackupReason,
) -> AppResult<BackupEntry> {
    let db_size = fs::metadata(db_path)
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "db_metadata")
                .with_context("path", db_path.display().to_string())
        })?
        .len();

    fs::create_dir_all(backup_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backups_dir")
            .with_context("path", backup_dir.display().to_string())
    })?;

    let required = required_free_bytes(db_size);
    let available = available_space(backup_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "available_space")
            .with_context("path", backup_dir.display().to_string())
    })?;
    if available < required {
        return Err(AppError::new(
            "DB_BACKUP/LOW_DISK",
            "Not enough free disk space for a backup",
        )
        .with_context("available_bytes", available.to_string())
        .with_context("required_bytes", required.to_string()));
    }

    let final_path = unique_backup_path(backup_dir, reason.prefix(), &time::file_stamp())?;
    let mut partial = final_path.clone().into_os_string();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = run_sqlite_backup(db_path, &partial).and_then(|_| {
        fs::rename(&partial, &final_path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "finalize_backup")
                .with_context("to", final_path.display().to_string())
        })
    });
    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    sync_dir(backup_dir).ok();

    let size_bytes = fs::metadata(&final_path).map(|m| m.len()).unwrap_or(db_size);
    info!(
        target: "repairdesk",
        event = "backup_created",
        reason = reason.prefix(),
        path = %final_path.display(),
        size_bytes
    );

    Ok(BackupEntry {
        path: final_path,
        size_bytes,
        reason,
    })
}

/// Take a backup and prune expired ones, logging instead of failing.
///
/// Used before migrations and imports, which must proceed even when the copy
/// cannot be made. Returns `None` when no backup was written.
pub async fn backup_and_prune(config: &AppConfig, reason: BackupReason) -> Option<BackupEntry> {
    if !config.db_path.exists() {
        info!(
            target: "repairdesk",
            event = "backup_skipped",
            reason = reason.prefix(),
            path = %config.db_path.display(),
            "no database file yet"
        );
        return None;
    }

    let entry = match create_backup(&config.db_path, &config.backup_dir, reason).await {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(
                target: "repairdesk",
                event = "backup_failed",
                reason = reason.prefix(),
                error = %err
            );
            None
        }
    };

    let dir = config.backup_dir.clone();
    let days = config.retention_days;
    let pruned = task::spawn_blocking(move || prune_expired(&dir, days, SystemTime::now())).await;
    match pruned {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            warn!(target: "repairdesk", event = "backup_prune_failed", error = %err);
        }
        Err(err) => {
            warn!(target: "repairdesk", event = "backup_prune_failed", error = %err);
        }
    }

    entry
}

/// Delete backup files whose modification time is more than `retention_days`
/// before `now`. Files that do not look like backups are left alone.
pub fn prune_expired(
    backup_dir: &Path,
    retention_days: u32,
    now: SystemTime,
) -> AppResult<Vec<PathBuf>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }
    let window = Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY);
    let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = Vec::new();
    for entry in fs::read_dir(backup_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "read_backups_dir")
            .with_context("path", backup_dir.display().to_string())
    })? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(target: "repairdesk", error = %err, "skip_invalid_backup_entry");
                continue;
            }
        };
        let path = entry.path();
        if !is_backup_file(&path) {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!(target: "repairdesk", error = %err, path = %path.display(), "skip_backup_no_mtime");
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(target: "repairdesk", event = "backup_pruned", path = %path.display());
                removed.push(path);
            }
            Err(err) => {
                warn!(
                    target: "repairdesk",
                    error = %err,
                    path = %path.display(),
                    "failed_to_remove_old_backup"
                );
            }
        }
    }
    Ok(removed)
}

fn is_backup_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(BACKUP_EXTENSION)
}

fn required_free_bytes(db_size: u64) -> u64 {
    ((db_size as f64 * REQUIRED_FREE_MULTIPLIER).ceil()) as u64
}

fn unique_backup_path(root: &Path, prefix: &str, stamp: &str) -> AppResult<PathBuf> {
    let base = format!("{prefix}_{stamp}");
    for suffix in 0..100 {
        let candidate = if suffix == 0 {
            root.join(format!("{base}.{BACKUP_EXTENSION}"))
        } else {
            root.join(format!("{base}-{suffix:02}.{BACKUP_EXTENSION}"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(AppError::new(
        "DB_BACKUP/NAME_COLLISION",
        "Unable to allocate backup file name",
    ))
}

fn run_sqlite_backup(src: &Path, dest: &Path) -> AppResult<()> {
    let src_conn = Connection::open_with_flags(src, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(
        |err| {
            AppError::from(err)
                .with_context("operation", "open_source_db")
                .with_context("path", src.display().to_string())
        },
    )?;
    let mut dest_conn = Connection::open(dest).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backup_db")
            .with_context("path", dest.display().to_string())
    })?;

    {
        let backup = Backup::new(&src_conn, &mut dest_conn)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_init"))?;
        backup
            .step(-1)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_step"))?;
    }

    dest_conn.execute_batch("PRAGMA journal_mode=DELETE;").ok();
    dest_conn
        .close()
        .map_err(|(_, err)| AppError::from(err).with_context("operation", "close_backup_db"))?;
    src_conn
        .close()
        .map_err(|(_, err)| AppError::from(err).with_context("operation", "close_source_db"))?;
    Ok(())
}

fn sync_dir(path: &Path) -> io::Result<()> {
    fs::File::open(path)?.sync_all()
}
