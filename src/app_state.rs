use std::sync::Arc;

use crate::core::state::runtime::sync::sync_supervisor::SyncSupervisor;
use crate::domain::common::model::monitored_app::AppCatalog;
use crate::domain::metric::service::metric_fetch_service::MetricFetchService;
use crate::domain::metric::service::metric_query_service::MetricQueryService;

/// Long-lived services shared by every handler. Built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<AppCatalog>,
    pub sync_supervisor: Arc<SyncSupervisor>,
    pub metric_fetch_service: Arc<MetricFetchService>,
    pub metric_query_service: Arc<MetricQueryService>,
}
