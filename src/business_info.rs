use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::AppResult;

/// Organisation details stamped onto generated documents. Stored as the single
/// row with `id = 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusinessInfo {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

impl Default for BusinessInfo {
    fn default() -> Self {
        Self {
            name: Some("Business Name Here".into()),
            address: Some("Address line 1\nAddress line 2".into()),
            phone: Some("Phone".into()),
            email: Some("email@example.com".into()),
            website: Some("https://example.com".into()),
        }
    }
}

/// The stored record, or the defaults when the row is missing.
pub async fn get(pool: &SqlitePool) -> AppResult<BusinessInfo> {
    let row = sqlx::query_as::<_, BusinessInfo>(
        "SELECT name, address, phone, email, website FROM business_info WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or_default())
}

pub async fn save(pool: &SqlitePool, info: &BusinessInfo) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO business_info (id, name, address, phone, email, website)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           address = excluded.address,
           phone = excluded.phone,
           email = excluded.email,
           website = excluded.website",
    )
    .bind(&info.name)
    .bind(&info.address)
    .bind(&info.phone)
    .bind(&info.email)
    .bind(&info.website)
    .execute(pool)
    .await?;
    info!(target: "repairdesk", event = "business_info_saved");
    Ok(())
}

pub async fn restore_defaults(pool: &SqlitePool) -> AppResult<BusinessInfo> {
    let defaults = BusinessInfo::default();
    save(pool, &defaults).await?;
    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::migrate::apply_migrations;

    #[tokio::test]
    async fn seeded_row_matches_defaults() {
        let store = Store::open_in_memory().await.unwrap();
        apply_migrations(store.pool()).await.unwrap();
        assert_eq!(get(store.pool()).await.unwrap(), BusinessInfo::default());
    }

    #[tokio::test]
    async fn save_then_restore() {
        let store = Store::open_in_memory().await.unwrap();
        apply_migrations(store.pool()).await.unwrap();

        let mine = BusinessInfo {
            name: Some("Fixit Ltd".into()),
            website: None,
            ..Default::default()
        };
        save(store.pool(), &mine).await.unwrap();
        assert_eq!(get(store.pool()).await.unwrap(), mine);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM business_info")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        restore_defaults(store.pool()).await.unwrap();
        assert_eq!(get(store.pool()).await.unwrap(), BusinessInfo::default());
    }

    #[tokio::test]
    async fn missing_row_falls_back_to_defaults() {
        let store = Store::open_in_memory().await.unwrap();
        apply_migrations(store.pool()).await.unwrap();
        sqlx::query("DELETE FROM business_info")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(get(store.pool()).await.unwrap(), BusinessInfo::default());
    }
}
