use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use super::metric_snapshot_entity::MeasureKind;
use super::metric_store_naming::{is_auxiliary_table, PodTables};

/// One stored sample of a metric, with its labels.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricPointRow {
    pub time: String,
    pub value_id: i64,
    pub value: String,
    pub measure: MeasureKind,
    pub labels: BTreeMap<String, String>,
}

/// Latest help text and type of a metric.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricSummaryRow {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: String,
}

/// Metrics tables of every pod in the store, sorted.
pub async fn list_pod_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("failed to list tables")?;

    Ok(names.into_iter().filter(|n| !is_auxiliary_table(n)).collect())
}

pub async fn pod_table_exists(pool: &SqlitePool, tables: &PodTables) -> Result<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(&tables.metrics)
            .fetch_optional(pool)
            .await
            .context("failed to look up pod table")?;
    Ok(found.is_some())
}

pub async fn distinct_metric_names(pool: &SqlitePool, tables: &PodTables) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(&format!(
        r#"SELECT DISTINCT name FROM "{}" ORDER BY name"#,
        tables.metrics
    ))
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to read metric names from '{}'", tables.metrics))?;
    Ok(names)
}

/// Every retained sample of `metric`, oldest first.
pub async fn metric_points(
    pool: &SqlitePool,
    tables: &PodTables,
    metric: &str,
) -> Result<Vec<MetricPointRow>> {
    let label_rows = sqlx::query(&format!(
        r#"SELECT l.value_id, l.key, l.value
           FROM "{l}" l
           JOIN "{v}" v ON l.value_id = v.id
           JOIN "{m}" m ON v.metric_id = m.id
           WHERE m.name = ?"#,
        l = tables.labels,
        v = tables.values,
        m = tables.metrics
    ))
    .bind(metric)
    .fetch_all(pool)
    .await
    .context("failed to read labels")?;

    let mut labels: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
    for row in label_rows {
        labels
            .entry(row.try_get("value_id")?)
            .or_default()
            .insert(row.try_get("key")?, row.try_get("value")?);
    }

    let rows = sqlx::query(&format!(
        r#"SELECT m.currentTime AS time, v.id AS value_id, v.value AS value, v.measure AS measure
           FROM "{m}" m
           JOIN "{v}" v ON v.metric_id = m.id
           WHERE m.name = ?
           ORDER BY m.currentTime, v.id"#,
        m = tables.metrics,
        v = tables.values
    ))
    .bind(metric)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to read samples of '{metric}'"))?;

    rows.into_iter()
        .map(|row| {
            let value_id: i64 = row.try_get("value_id")?;
            Ok(MetricPointRow {
                time: row.try_get("time")?,
                value_id,
                value: row.try_get::<Option<String>, _>("value")?.unwrap_or_default(),
                // Rows written by an older layout read as uninterpreted.
                measure: row
                    .try_get::<Option<String>, _>("measure")?
                    .and_then(MeasureKind::from_code)
                    .unwrap_or(MeasureKind::UnhandledMetricType),
                labels: labels.remove(&value_id).unwrap_or_default(),
            })
        })
        .collect()
}

/// One entry per metric name, taken from its most recent row.
pub async fn metric_summaries(
    pool: &SqlitePool,
    tables: &PodTables,
) -> Result<Vec<MetricSummaryRow>> {
    let rows = sqlx::query(&format!(
        r#"SELECT name, help, type FROM "{m}"
           WHERE id IN (SELECT MAX(id) FROM "{m}" GROUP BY name)
           ORDER BY name"#,
        m = tables.metrics
    ))
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to summarize '{}'", tables.metrics))?;

    rows.into_iter()
        .map(|row| {
            Ok(MetricSummaryRow {
                name: row.try_get("name")?,
                help: row.try_get::<Option<String>, _>("help")?.unwrap_or_default(),
                metric_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
            })
        })
        .collect()
}
