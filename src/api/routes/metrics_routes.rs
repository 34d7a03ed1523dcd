//! Metrics routes (e.g., /api/v1/metrics/*)

use axum::{routing::get, Router};

use crate::api::controller::metric::metrics_controller::MetricsController;
use crate::app_state::AppState;

/// Build the router for metrics endpoints under /api/v1/metrics
pub fn metrics_routes() -> Router<AppState> {
    Router::new()
        // Sync control across every application
        .route("/", get(MetricsController::get_all_apps))
        // One application: sync control, catalog, on-demand fetch
        .route("/{app}", get(MetricsController::get_app))
        // One pod's stored metrics
        .route("/{app}/{pod}", get(MetricsController::get_pod))
}
