use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::metric_store_naming::sanitize_identifier;

const CONTROL_DB: &str = "control.db";

/// Both handles onto one application store.
#[derive(Clone)]
struct StoreHandles {
    writer: SqlitePool,
    reader: Option<SqlitePool>,
}

/// Owns every per-application SQLite store.
///
/// Writer pools are capped at a single connection so the embedded engine never
/// sees two concurrent writers on the same file. Readers get their own read-only
/// pool and run alongside the writer (WAL journal).
pub struct MetricStoreRegistry {
    base_dir: PathBuf,
    stores: Mutex<HashMap<String, StoreHandles>>,
    control: SqlitePool,
}

impl MetricStoreRegistry {
    /// Creates the data directory and the control store. Failing here is fatal
    /// for the process.
    pub async fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", base_dir.display()))?;

        let control = connect_writer(&base_dir.join(CONTROL_DB))
            .await
            .context("failed to open control store")?;

        info!(path = %base_dir.display(), "Metric store registry ready");
        Ok(Self {
            base_dir,
            stores: Mutex::new(HashMap::new()),
            control,
        })
    }

    pub fn control_pool(&self) -> &SqlitePool {
        &self.control
    }

    pub fn store_path(&self, app: &str) -> PathBuf {
        self.base_dir.join(format!("{}.db", sanitize_identifier(app)))
    }

    /// Single-connection pool for the writer; opens and creates the store lazily.
    pub async fn writer(&self, app: &str) -> Result<SqlitePool> {
        let key = sanitize_identifier(app);
        let mut stores = self.stores.lock().await;
        if let Some(handles) = stores.get(&key) {
            return Ok(handles.writer.clone());
        }

        let path = self.store_path(app);
        let writer = connect_writer(&path)
            .await
            .with_context(|| format!("failed to open store for app '{app}'"))?;
        debug!(app, path = %path.display(), "Opened metric store");

        stores.insert(
            key,
            StoreHandles {
                writer: writer.clone(),
                reader: None,
            },
        );
        Ok(writer)
    }

    /// Read-only pool, or `None` when the application has never been written.
    pub async fn reader(&self, app: &str) -> Result<Option<SqlitePool>> {
        let key = sanitize_identifier(app);
        let path = self.store_path(app);

        let mut stores = self.stores.lock().await;
        if let Some(reader) = stores.get(&key).and_then(|h| h.reader.clone()) {
            return Ok(Some(reader));
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        // Store left by an earlier process: the writer connection keeps the WAL
        // index alive for read-only handles.
        if !stores.contains_key(&key) {
            let writer = connect_writer(&path).await?;
            stores.insert(key.clone(), StoreHandles { writer, reader: None });
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));
        let reader = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open read handle for app '{app}'"))?;

        if let Some(handles) = stores.get_mut(&key) {
            handles.reader = Some(reader.clone());
        }
        Ok(Some(reader))
    }

    /// Closes every pool. Called once on shutdown.
    pub async fn close(&self) {
        let stores = self.stores.lock().await;
        for handles in stores.values() {
            if let Some(reader) = &handles.reader {
                reader.close().await;
            }
            handles.writer.close().await;
        }
        self.control.close().await;
    }
}

async fn connect_writer(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("kdash-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn writer_creates_store_file_lazily() {
        let dir = temp_dir();
        let registry = MetricStoreRegistry::open(&dir).await.unwrap();

        assert!(registry.reader("karmada-scheduler").await.unwrap().is_none());

        let pool = registry.writer("karmada-scheduler").await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(registry.store_path("karmada-scheduler").ends_with("karmada_scheduler.db"));
        assert!(registry.reader("karmada-scheduler").await.unwrap().is_some());

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn writer_pool_is_single_connection() {
        let dir = temp_dir();
        let registry = MetricStoreRegistry::open(&dir).await.unwrap();
        let pool = registry.writer("app").await.unwrap();
        assert_eq!(pool.options().get_max_connections(), 1);

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
