//! SQLite-backed settings storage

use async_trait::async_trait;
use sentinel_core::{PhoneNumber, PhoneStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::PHONE_KEY;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Key-value settings store on SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `url`.
    ///
    /// In-memory URLs get a single connection so every query sees the
    /// same database.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StateError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened settings store at {}", url);
        Ok(store)
    }

    /// Fresh in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Migration(e.to_string()))?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!("Stored setting {}", key);
        Ok(())
    }

    /// Returns whether a row was removed
    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PhoneStore for SqliteStore {
    async fn load_phone(&self) -> sentinel_core::Result<Option<PhoneNumber>> {
        match self.get_setting(PHONE_KEY).await? {
            Some(raw) => PhoneNumber::parse(&raw)
                .map(Some)
                .map_err(|e| StateError::InvalidData(e.to_string()).into()),
            None => Ok(None),
        }
    }

    async fn save_phone(&self, phone: &PhoneNumber) -> sentinel_core::Result<()> {
        self.set_setting(PHONE_KEY, phone.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();

        assert_eq!(store.get_setting("missing").await.unwrap(), None);

        store.set_setting("a", "1").await.unwrap();
        store.set_setting("a", "2").await.unwrap();
        assert_eq!(store.get_setting("a").await.unwrap().as_deref(), Some("2"));

        assert!(store.delete_setting("a").await.unwrap());
        assert!(!store.delete_setting("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_phone_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.load_phone().await.unwrap().is_none());

        let phone = PhoneNumber::parse("98765 43210").unwrap();
        store.save_phone(&phone).await.unwrap();
        assert_eq!(store.load_phone().await.unwrap(), Some(phone));
    }

    #[tokio::test]
    async fn test_corrupt_phone_is_storage_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set_setting(PHONE_KEY, "12").await.unwrap();

        let err = store.load_phone().await.unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }
}
