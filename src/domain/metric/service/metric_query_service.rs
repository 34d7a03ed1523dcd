use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::persistence::metrics::metric_sqlite_reader::{
    distinct_metric_names, list_pod_tables, metric_points, metric_summaries, pod_table_exists,
    MetricPointRow, MetricSummaryRow,
};
use crate::core::persistence::metrics::metric_store_naming::PodTables;
use crate::core::persistence::metrics::metric_store_registry::MetricStoreRegistry;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("metric name is required")]
    MissingMetricName,

    #[error("no metrics stored for pod '{0}'")]
    UnknownPod(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Metric time series for one pod.
#[derive(Debug, Serialize)]
pub struct MetricDetails {
    pub pod: String,
    pub metric: String,
    pub points: Vec<MetricPointRow>,
}

/// The metrics one pod reports.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PodMetricCatalog {
    pub pod: String,
    pub metrics: Vec<MetricSummaryRow>,
}

/// Read-only view over the application stores.
pub struct MetricQueryService {
    registry: Arc<MetricStoreRegistry>,
}

impl MetricQueryService {
    pub fn new(registry: Arc<MetricStoreRegistry>) -> Self {
        Self { registry }
    }

    pub async fn metric_names(&self, app: &str, pod: &str) -> Result<Vec<String>, QueryError> {
        let Some(pool) = self.registry.reader(app).await? else {
            return Ok(Vec::new());
        };
        let tables = self.pod_tables(&pool, pod).await?;
        Ok(distinct_metric_names(&pool, &tables).await?)
    }

    pub async fn metric_details(
        &self,
        app: &str,
        pod: &str,
        metric: &str,
    ) -> Result<MetricDetails, QueryError> {
        if metric.trim().is_empty() {
            return Err(QueryError::MissingMetricName);
        }

        let points = match self.registry.reader(app).await? {
            Some(pool) => {
                let tables = self.pod_tables(&pool, pod).await?;
                metric_points(&pool, &tables, metric).await?
            }
            None => Vec::new(),
        };
        debug!(app, pod, metric, points = points.len(), "Read metric details");

        Ok(MetricDetails {
            pod: pod.to_string(),
            metric: metric.to_string(),
            points,
        })
    }

    /// Per-pod summary of every pod stored for `app`.
    pub async fn catalog(&self, app: &str) -> Result<Vec<PodMetricCatalog>, QueryError> {
        let Some(pool) = self.registry.reader(app).await? else {
            return Ok(Vec::new());
        };

        let mut catalog = Vec::new();
        for table in list_pod_tables(&pool).await? {
            let tables = PodTables::from_base(table);
            let metrics = metric_summaries(&pool, &tables).await?;
            catalog.push(PodMetricCatalog {
                pod: tables.metrics,
                metrics,
            });
        }
        Ok(catalog)
    }

    async fn pod_tables(
        &self,
        pool: &sqlx::SqlitePool,
        pod: &str,
    ) -> Result<PodTables, QueryError> {
        let tables = PodTables::for_pod(pod);
        if !pod_table_exists(pool, &tables).await? {
            return Err(QueryError::UnknownPod(pod.to_string()));
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::metrics::metric_snapshot_entity::{
        MeasureKind, MetricEntity, MetricSnapshotEntity, MetricValueEntity,
    };
    use crate::core::persistence::metrics::metric_store_registry::tests::temp_dir;
    use crate::core::persistence::metrics::metric_write_queue::{MetricWriter, WriteRequest};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn snapshot(second: i64, requests: u32) -> MetricSnapshotEntity {
        let time = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::seconds(second);
        let mut snapshot = MetricSnapshotEntity::new(time);
        snapshot.metrics.insert(
            "http_requests_total".into(),
            MetricEntity {
                name: "http_requests_total".into(),
                help: "Requests served.".into(),
                metric_type: "COUNTER".into(),
                values: vec![MetricValueEntity {
                    labels: BTreeMap::from([
                        ("code".to_string(), "200".to_string()),
                        ("method".to_string(), "GET".to_string()),
                    ]),
                    value: format!("{requests}.000000"),
                    measure: MeasureKind::Total,
                }],
            },
        );
        snapshot.metrics.insert(
            "workqueue_depth".into(),
            MetricEntity {
                name: "workqueue_depth".into(),
                help: "Depth.".into(),
                metric_type: "GAUGE".into(),
                values: vec![MetricValueEntity {
                    labels: BTreeMap::new(),
                    value: "3.000000".into(),
                    measure: MeasureKind::CurrentValue,
                }],
            },
        );
        snapshot
    }

    async fn seeded() -> (MetricQueryService, Arc<MetricStoreRegistry>, std::path::PathBuf) {
        let dir = temp_dir();
        let registry = Arc::new(MetricStoreRegistry::open(&dir).await.unwrap());
        let (queue, _handle) = MetricWriter::spawn(registry.clone(), 900, 8);

        for (second, requests) in [(0, 10), (1, 12), (2, 15)] {
            let taken = snapshot(second, requests);
            let request = WriteRequest::new("karmada-scheduler", "sched-0", taken);
            let outcome = queue.persist(request).await.unwrap();
            assert!(outcome.is_committed());
        }
        queue
            .persist(WriteRequest::new("karmada-scheduler", "sched-1", snapshot(0, 1)))
            .await
            .unwrap();

        (MetricQueryService::new(registry.clone()), registry, dir)
    }

    #[tokio::test]
    async fn names_are_distinct_and_sorted() {
        let (service, registry, dir) = seeded().await;

        let names = service.metric_names("karmada-scheduler", "sched-0").await.unwrap();
        assert_eq!(names, vec!["http_requests_total", "workqueue_depth"]);

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn details_return_time_ordered_points_with_labels() {
        let (service, registry, dir) = seeded().await;

        let details = service
            .metric_details("karmada-scheduler", "sched-0", "http_requests_total")
            .await
            .unwrap();
        let values: Vec<_> = details.points.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["10.000000", "12.000000", "15.000000"]);
        assert!(details.points.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(details.points[0].measure, MeasureKind::Total);
        assert_eq!(details.points[0].labels["method"], "GET");
        assert_eq!(details.points[0].labels.len(), 2);

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_metric_name_and_unknown_pod_are_errors() {
        let (service, registry, dir) = seeded().await;

        assert!(matches!(
            service.metric_details("karmada-scheduler", "sched-0", "").await,
            Err(QueryError::MissingMetricName)
        ));
        assert!(matches!(
            service.metric_names("karmada-scheduler", "sched-9").await,
            Err(QueryError::UnknownPod(pod)) if pod == "sched-9"
        ));

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn catalog_skips_auxiliary_tables() {
        let (service, registry, dir) = seeded().await;

        let catalog = service.catalog("karmada-scheduler").await.unwrap();
        let pods: Vec<_> = catalog.iter().map(|c| c.pod.as_str()).collect();
        assert_eq!(pods, vec!["sched_0", "sched_1"]);
        assert_eq!(catalog[0].metrics.len(), 2);
        assert_eq!(catalog[0].metrics[0].metric_type, "COUNTER");

        assert!(service.catalog("karmada-webhook").await.unwrap().is_empty());

        registry.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
