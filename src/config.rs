use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub const APP_DIR_NAME: &str = "repairdesk";
pub const DB_FILE_NAME: &str = "repairdesk.sqlite3";
pub const BACKUP_DIR_NAME: &str = "backups";

pub const DEFAULT_RETENTION_DAYS: u32 = 15;
const MAX_RETENTION_DAYS: u32 = 365;

/// Resolved runtime configuration. Built once at startup and passed down.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub retention_days: u32,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve from explicit overrides first, then `REPAIRDESK_*` variables,
    /// then platform defaults.
    pub fn load(db: Option<PathBuf>, backup_dir: Option<PathBuf>) -> Self {
        let db_path = db
            .or_else(|| env_path("REPAIRDESK_DB"))
            .unwrap_or_else(default_db_path);
        let backup_dir = backup_dir
            .or_else(|| env_path("REPAIRDESK_BACKUP_DIR"))
            .unwrap_or_else(|| default_backup_dir(&db_path));
        let retention_days = parse_retention(env::var("REPAIRDESK_BACKUP_RETENTION_DAYS").ok());
        let log_dir = env_path("REPAIRDESK_LOG_DIR");

        Self {
            db_path,
            backup_dir,
            retention_days,
            log_dir,
        }
    }

    pub fn for_db(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let backup_dir = default_backup_dir(&db_path);
        Self {
            db_path,
            backup_dir,
            retention_days: DEFAULT_RETENTION_DAYS,
            log_dir: None,
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn parse_retention(raw: Option<String>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .map(|value| value.min(MAX_RETENTION_DAYS))
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

pub fn default_db_path() -> PathBuf {
    let base = dirs::data_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR_NAME).join(DB_FILE_NAME)
}

pub fn default_backup_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(|parent| parent.join(BACKUP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR_NAME))
}
