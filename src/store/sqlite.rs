use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{ConfigStore, Directory, SettingValue, SettingsMap, StoreError};
use crate::models::site::Site;
use crate::models::{SiteId, UserId};

const ADMINISTRATOR_ROLE: &str = "administrator";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode(key: &str, raw: Option<String>) -> Result<Option<SettingValue>, StoreError> {
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
    })
    .transpose()
}

fn encode(key: &str, value: &SettingValue) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn site_setting(&self, site_id: SiteId, key: &str) -> Result<Option<SettingValue>, StoreError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM site_settings WHERE site_id = ? AND key = ?")
                .bind(site_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        decode(key, raw)
    }

    async fn network_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM network_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        decode(key, raw)
    }

    async fn save_site_settings(&self, site_id: SiteId, settings: &SettingsMap) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM sites WHERE id = ?")
            .bind(site_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(StoreError::UnknownSite(site_id));
        }

        for (key, value) in settings {
            sqlx::query(
                "INSERT INTO site_settings (site_id, key, value, updated_at) VALUES (?, ?, ?, CURRENT_TIMESTAMP) \
                 ON CONFLICT(site_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(site_id)
            .bind(key)
            .bind(encode(key, value)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_network_settings(&self, settings: &SettingsMap) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in settings {
            sqlx::query(
                "INSERT INTO network_settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(encode(key, value)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Directory for SqliteStore {
    async fn site(&self, site_id: SiteId) -> Result<Option<Site>, StoreError> {
        let site = sqlx::query_as::<_, Site>("SELECT id, name, url, hidden FROM sites WHERE id = ?")
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(site)
    }

    async fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM pages WHERE site_id = ? AND path = ?")
            .bind(site_id)
            .bind(path)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn is_site_admin(&self, user_id: UserId, site_id: SiteId) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM site_members WHERE user_id = ? AND site_id = ? AND role = ?",
        )
        .bind(user_id)
        .bind(site_id)
        .bind(ADMINISTRATOR_ROLE)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT is_super_admin FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(flag.unwrap_or(false))
    }

    async fn sites_of_user(&self, user_id: UserId, include_hidden: bool) -> Result<Vec<SiteId>, StoreError> {
        let ids: Vec<SiteId> = sqlx::query_scalar(
            "SELECT s.id FROM site_members m JOIN sites s ON s.id = m.site_id \
             WHERE m.user_id = ? AND (? OR s.hidden = 0) ORDER BY s.id",
        )
        .bind(user_id)
        .bind(include_hidden)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn primary_site(&self, user_id: UserId) -> Result<Option<SiteId>, StoreError> {
        let primary: Option<Option<SiteId>> =
            sqlx::query_scalar("SELECT primary_site_id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(primary.flatten())
    }
}
