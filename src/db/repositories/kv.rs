use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{db::Database, storage::KeyValueStore};

impl Database {
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read key '{key}'"))?;
            Ok(value)
        })
        .await
    }

    pub async fn set_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key '{key}'"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.set_value(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upserts_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pomodoro.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            assert_eq!(db.get("pomodoroHistory").await.unwrap(), None);
            db.set("pomodoroHistory", "[]".into()).await.unwrap();
            db.set("pomodoroHistory", "[1]".into()).await.unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(
            db.get("pomodoroHistory").await.unwrap().as_deref(),
            Some("[1]")
        );
    }
}
