use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;
use validator::Validate;

use crate::api::dto::metrics_dto::{MetricsQuery, MetricsQueryKind};
use crate::api::dto::ApiResponse;
use crate::api::util::json::to_json;
use crate::app_state::AppState;
use crate::errors::AppError;

pub struct MetricsController;

impl MetricsController {
    /// `GET /metrics?type=sync_on|sync_off|sync_status` for every application.
    pub async fn get_all_apps(
        State(state): State<AppState>,
        Query(q): Query<MetricsQuery>,
    ) -> Result<Json<ApiResponse<Value>>, AppError> {
        validate(&q)?;
        let supervisor = &state.sync_supervisor;
        match q.kind() {
            MetricsQueryKind::SyncOn => {
                to_json(Ok::<_, AppError>(supervisor.turn_on_all().await))
            }
            MetricsQueryKind::SyncOff => {
                to_json(Ok::<_, AppError>(supervisor.turn_off_all().await))
            }
            MetricsQueryKind::SyncStatus => to_json(Ok::<_, AppError>(supervisor.status().await)),
            _ => Err(AppError::BadRequest(
                "type must be one of sync_on, sync_off, sync_status".into(),
            )),
        }
    }

    /// `GET /metrics/{app}`: sync control, stored catalog, or an on-demand fetch.
    pub async fn get_app(
        State(state): State<AppState>,
        Path(app): Path<String>,
        Query(q): Query<MetricsQuery>,
    ) -> Result<Json<ApiResponse<Value>>, AppError> {
        validate(&q)?;
        let supervisor = &state.sync_supervisor;
        match q.kind() {
            MetricsQueryKind::SyncOn => to_json(supervisor.turn_on(&app).await),
            MetricsQueryKind::SyncOff => to_json(supervisor.turn_off(&app).await),
            // Status always covers every application.
            MetricsQueryKind::SyncStatus => to_json(Ok::<_, AppError>(supervisor.status().await)),
            MetricsQueryKind::MetricsDetails => {
                ensure_known(&state, &app)?;
                to_json(state.metric_query_service.catalog(&app).await)
            }
            _ => to_json(state.metric_fetch_service.fetch(&app).await),
        }
    }

    /// `GET /metrics/{app}/{pod}`: stored metric names or one metric's series.
    pub async fn get_pod(
        State(state): State<AppState>,
        Path((app, pod)): Path<(String, String)>,
        Query(q): Query<MetricsQuery>,
    ) -> Result<Json<ApiResponse<Value>>, AppError> {
        validate(&q)?;
        ensure_known(&state, &app)?;
        let queries = &state.metric_query_service;
        match q.kind() {
            MetricsQueryKind::MetricNames => to_json(queries.metric_names(&app, &pod).await),
            MetricsQueryKind::Details => {
                let metric = q.mname.as_deref().ok_or_else(|| {
                    AppError::BadRequest("mname is required for type=details".into())
                })?;
                to_json(queries.metric_details(&app, &pod, metric).await)
            }
            MetricsQueryKind::MetricsDetails => to_json(queries.catalog(&app).await),
            _ => Err(AppError::BadRequest(
                "type must be one of mname, details, metricsdetails".into(),
            )),
        }
    }
}

fn validate(q: &MetricsQuery) -> Result<(), AppError> {
    q.validate().map_err(|e| AppError::BadRequest(e.to_string()))
}

fn ensure_known(state: &AppState, app: &str) -> Result<(), AppError> {
    match state.catalog.get(app) {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("unknown application '{app}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::core::persistence::metrics::metric_store_registry::tests::temp_dir;
    use crate::core::persistence::metrics::metric_store_registry::MetricStoreRegistry;
    use crate::core::persistence::metrics::metric_write_queue::MetricWriteQueue;
    use crate::core::persistence::sync::app_sync_repository::AppSyncSqliteRepository;
    use crate::core::state::runtime::sync::sync_supervisor::SyncSupervisor;
    use crate::domain::common::model::monitored_app::AppCatalog;
    use crate::domain::metric::service::metric_fetch_service::MetricFetchService;
    use crate::domain::metric::service::metric_query_service::MetricQueryService;
    use crate::scheduler::tasks::collectors::karmada::source::tests::MockMetricsSource;
    use crate::scheduler::tasks::collectors::karmada::task::MetricsCollector;

    async fn state() -> AppState {
        let registry = Arc::new(MetricStoreRegistry::open(temp_dir()).await.unwrap());
        let repository = AppSyncSqliteRepository::new(registry.control_pool().clone())
            .await
            .unwrap();
        // The mock source finds no pods, so nothing is ever enqueued.
        let (queue, _rx) = MetricWriteQueue::detached(1);
        let collector = MetricsCollector::new(Arc::new(MockMetricsSource::default()), queue);
        let catalog = Arc::new(AppCatalog::build("karmada-system", &["member1".into()]));

        AppState {
            catalog: catalog.clone(),
            sync_supervisor: Arc::new(SyncSupervisor::new(
                catalog.clone(),
                collector.clone(),
                Arc::new(repository),
                Duration::from_millis(20),
            )),
            metric_fetch_service: Arc::new(MetricFetchService::new(catalog, collector)),
            metric_query_service: Arc::new(MetricQueryService::new(registry)),
        }
    }

    fn query(kind: &str) -> Query<MetricsQuery> {
        Query(MetricsQuery {
            query_type: Some(kind.to_string()),
            mname: None,
        })
    }

    #[tokio::test]
    async fn app_sync_status_lists_every_application() {
        let state = state().await;
        let total = state.catalog.apps().len();
        state.sync_supervisor.turn_on("karmada-scheduler").await.unwrap();

        for app in ["karmada-scheduler", "no-such-app"] {
            let Json(response) = MetricsController::get_app(
                State(state.clone()),
                Path(app.to_string()),
                query("sync_status"),
            )
            .await
            .unwrap();

            let data = response.data.unwrap();
            let status = data.as_object().unwrap();
            assert_eq!(status.len(), total);
            assert_eq!(status["karmada-scheduler"], Value::Bool(true));
            assert_eq!(status["karmada-webhook"], Value::Bool(false));
        }

        state.sync_supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn pod_route_rejects_unknown_type() {
        let state = state().await;
        let result = MetricsController::get_pod(
            State(state),
            Path(("karmada-scheduler".to_string(), "sched-0".to_string())),
            query("sync_on"),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
