use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Desired on/off state per application, kept across restarts.
#[async_trait]
pub trait AppSyncRepository: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<String, bool>>;

    async fn upsert(&self, app: &str, enabled: bool) -> Result<()>;
}

/// `app_sync` table inside the control store.
pub struct AppSyncSqliteRepository {
    pool: SqlitePool,
}

impl AppSyncSqliteRepository {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_sync (
                app_name TEXT PRIMARY KEY,
                sync_trigger INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create app_sync table")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl AppSyncRepository for AppSyncSqliteRepository {
    async fn load_all(&self) -> Result<HashMap<String, bool>> {
        let rows = sqlx::query("SELECT app_name, sync_trigger FROM app_sync")
            .fetch_all(&self.pool)
            .await
            .context("failed to read app_sync")?;

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            let app: String = row.try_get("app_name")?;
            let trigger: i64 = row.try_get("sync_trigger")?;
            states.insert(app, trigger != 0);
        }
        Ok(states)
    }

    async fn upsert(&self, app: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_sync (app_name, sync_trigger) VALUES (?, ?)
            ON CONFLICT(app_name) DO UPDATE SET sync_trigger = excluded.sync_trigger
            "#,
        )
        .bind(app)
        .bind(i64::from(enabled))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist sync state for '{app}'"))?;

        debug!(app, enabled, "Persisted sync trigger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn upsert_overwrites_previous_state() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = AppSyncSqliteRepository::new(pool).await.unwrap();

        repo.upsert("karmada-scheduler", true).await.unwrap();
        repo.upsert("karmada-scheduler", false).await.unwrap();
        repo.upsert("karmada-agent", true).await.unwrap();

        let states = repo.load_all().await.unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states.get("karmada-scheduler"), Some(&false));
        assert_eq!(states.get("karmada-agent"), Some(&true));
    }
}
