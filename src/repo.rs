use sqlx::SqlitePool;

use crate::db::schema::{ensure_entity_table, quote_ident};
use crate::{AppError, AppResult};

/// Delete one row by id from an entity table. Dependants follow the declared
/// foreign-key actions.
pub async fn delete_by_id(pool: &SqlitePool, table: &str, entity: &str, id: i64) -> AppResult<()> {
    ensure_entity_table(table)?;
    let sql = format!("DELETE FROM {} WHERE id = ?", quote_ident(table));
    let res = sqlx::query(&sql).bind(id).execute(pool).await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(entity, id));
    }
    tracing::info!(target: "repairdesk", event = "record_deleted", table, id);
    Ok(())
}

pub async fn count(pool: &SqlitePool, table: &str) -> AppResult<i64> {
    ensure_entity_table(table)?;
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    Ok(sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await?)
}

/// `%term%` with LIKE wildcards in `term` escaped; pair with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// Trimmed search term, or `None` when there is nothing to search for.
pub fn search_term(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ada"), "%ada%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn blank_search_is_none() {
        assert_eq!(search_term(None), None);
        assert_eq!(search_term(Some("   ")), None);
        assert_eq!(search_term(Some(" mac ")), Some("%mac%".to_string()));
    }
}
