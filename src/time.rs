use chrono::Local;

/// Local calendar date as `YYYY-MM-DD`, the format stored in the date columns.
pub fn today_iso() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Stamp used in backup file names.
pub fn file_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
