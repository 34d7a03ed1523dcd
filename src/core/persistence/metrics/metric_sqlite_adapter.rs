use anyhow::{Context, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use super::metric_snapshot_entity::MetricSnapshotEntity;
use super::metric_store_naming::{format_marker, PodTables};

/// What one committed write did to a pod's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub metrics_inserted: u64,
    pub values_inserted: u64,
    pub labels_inserted: u64,
    pub markers_evicted: u64,
    pub metrics_evicted: u64,
}

/// Runs the whole write for one snapshot inside `tx`. The caller commits or
/// rolls back based on the result.
pub async fn write_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    pod: &str,
    snapshot: &MetricSnapshotEntity,
    retention_window: u32,
) -> Result<WriteStats> {
    let tables = PodTables::for_pod(pod);
    let conn: &mut SqliteConnection = tx;
    let marker = format_marker(snapshot.current_time);

    ensure_schema(conn, &tables).await?;

    sqlx::query(&format!(
        r#"INSERT OR REPLACE INTO "{}" (time_entry) VALUES (?)"#,
        tables.time_load
    ))
    .bind(&marker)
    .execute(&mut *conn)
    .await
    .context("failed to record time marker")?;

    let mut stats = evict_outside_window(conn, &tables, retention_window).await?;

    for metric in snapshot.metrics.values() {
        let metric_id = sqlx::query(&format!(
            r#"INSERT INTO "{}" (name, help, type, currentTime) VALUES (?, ?, ?, ?)"#,
            tables.metrics
        ))
        .bind(&metric.name)
        .bind(&metric.help)
        .bind(&metric.metric_type)
        .bind(&marker)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to insert metric '{}'", metric.name))?
        .last_insert_rowid();
        stats.metrics_inserted += 1;

        for value in &metric.values {
            let value_id = sqlx::query(&format!(
                r#"INSERT INTO "{}" (metric_id, value, measure) VALUES (?, ?, ?)"#,
                tables.values
            ))
            .bind(metric_id)
            .bind(&value.value)
            .bind(value.measure.as_code())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("failed to insert value for '{}'", metric.name))?
            .last_insert_rowid();
            stats.values_inserted += 1;

            for (key, label) in &value.labels {
                sqlx::query(&format!(
                    r#"INSERT INTO "{}" (value_id, key, value) VALUES (?, ?, ?)"#,
                    tables.labels
                ))
                .bind(value_id)
                .bind(key)
                .bind(label)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("failed to insert label '{key}'"))?;
                stats.labels_inserted += 1;
            }
        }
    }

    Ok(stats)
}

async fn ensure_schema(conn: &mut SqliteConnection, tables: &PodTables) -> Result<()> {
    let statements = [
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{m}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                help TEXT,
                type TEXT,
                currentTime TEXT NOT NULL
            )"#,
            m = tables.metrics
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{v}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                metric_id INTEGER NOT NULL REFERENCES "{m}"(id),
                value TEXT,
                measure TEXT
            )"#,
            v = tables.values,
            m = tables.metrics
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{l}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value_id INTEGER NOT NULL REFERENCES "{v}"(id),
                key TEXT NOT NULL,
                value TEXT NOT NULL
            )"#,
            l = tables.labels,
            v = tables.values
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{t}" (time_entry TEXT PRIMARY KEY)"#,
            t = tables.time_load
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "{m}_time_idx" ON "{m}" (currentTime)"#,
            m = tables.metrics
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "{v}_metric_idx" ON "{v}" (metric_id)"#,
            v = tables.values
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS "{l}_value_idx" ON "{l}" (value_id)"#,
            l = tables.labels
        ),
    ];

    for statement in &statements {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("failed to create schema for '{}'", tables.metrics))?;
    }
    Ok(())
}

/// Drops every marker at or beyond `window` positions from the newest, with the
/// rows captured at or before it. Children go first so foreign keys hold.
async fn evict_outside_window(
    conn: &mut SqliteConnection,
    tables: &PodTables,
    window: u32,
) -> Result<WriteStats> {
    let cutoff: Option<String> = sqlx::query_scalar(&format!(
        r#"SELECT time_entry FROM "{}" ORDER BY time_entry DESC LIMIT 1 OFFSET ?"#,
        tables.time_load
    ))
    .bind(i64::from(window))
    .fetch_optional(&mut *conn)
    .await
    .context("failed to locate retention cutoff")?;

    let Some(cutoff) = cutoff else {
        return Ok(WriteStats::default());
    };

    sqlx::query(&format!(
        r#"DELETE FROM "{l}" WHERE value_id IN (
            SELECT v.id FROM "{v}" v JOIN "{m}" m ON v.metric_id = m.id
            WHERE m.currentTime <= ?
        )"#,
        l = tables.labels,
        v = tables.values,
        m = tables.metrics
    ))
    .bind(&cutoff)
    .execute(&mut *conn)
    .await
    .context("failed to evict labels")?;

    sqlx::query(&format!(
        r#"DELETE FROM "{v}" WHERE metric_id IN (SELECT id FROM "{m}" WHERE currentTime <= ?)"#,
        v = tables.values,
        m = tables.metrics
    ))
    .bind(&cutoff)
    .execute(&mut *conn)
    .await
    .context("failed to evict values")?;

    let metrics_evicted = sqlx::query(&format!(
        r#"DELETE FROM "{}" WHERE currentTime <= ?"#,
        tables.metrics
    ))
    .bind(&cutoff)
    .execute(&mut *conn)
    .await
    .context("failed to evict metrics")?
    .rows_affected();

    let markers_evicted = sqlx::query(&format!(
        r#"DELETE FROM "{}" WHERE time_entry <= ?"#,
        tables.time_load
    ))
    .bind(&cutoff)
    .execute(&mut *conn)
    .await
    .context("failed to evict time markers")?
    .rows_affected();

    Ok(WriteStats {
        markers_evicted,
        metrics_evicted,
        ..WriteStats::default()
    })
}
