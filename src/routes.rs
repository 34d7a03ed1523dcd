use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::routes::metrics_routes::metrics_routes;
use crate::app_state::AppState;

/// Build the main application router
pub fn app_router() -> Router<AppState> {
    let api_v1 = Router::new().nest("/metrics", metrics_routes());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .fallback(handler_404)
        .layer(CorsLayer::very_permissive())
}

async fn root() -> &'static str {
    "Karmada dashboard metrics core is running"
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}
