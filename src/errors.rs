use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::core::state::runtime::sync::sync_state::SyncError;
use crate::domain::metric::service::metric_fetch_service::FetchError;
use crate::domain::metric::service::metric_query_service::QueryError;
use crate::scheduler::tasks::collectors::karmada::task::CycleError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("K8s API error: {0}")]
    K8sApiError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Every pod of a fetch failed; the per-pod errors go in the body.
    #[error("Failed to fetch metrics from any pod")]
    ScrapeFailed(Vec<String>),
}

/// Helper for mapping any unknown error into internal error
pub fn internal_error<E: ToString>(err: E) -> AppError {
    AppError::InternalServerError(err.to_string())
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnknownApp(_) => AppError::NotFound(err.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::MissingMetricName => AppError::BadRequest(err.to_string()),
            QueryError::UnknownPod(_) => AppError::NotFound(err.to_string()),
            QueryError::Store(e) => AppError::DatabaseError(format!("{e:#}")),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::UnknownApp(_) => AppError::NotFound(err.to_string()),
            FetchError::AllFailed(errors) => AppError::ScrapeFailed(errors),
            FetchError::Cycle(e) => e.into(),
        }
    }
}

impl From<CycleError> for AppError {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Discovery(errors) => AppError::ScrapeFailed(errors),
            CycleError::Fetch(e) => AppError::K8sApiError(format!("{e:#}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::K8sApiError(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ScrapeFailed(_) => StatusCode::BAD_GATEWAY,
        };

        let body = match &self {
            AppError::ScrapeFailed(errors) => json!({
                "message": self.to_string(),
                "errors": errors,
            }),
            _ => json!({ "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_variant() {
        let cases = [
            (AppError::from(SyncError::UnknownApp("nginx".into())), StatusCode::NOT_FOUND),
            (AppError::from(QueryError::MissingMetricName), StatusCode::BAD_REQUEST),
            (AppError::ScrapeFailed(vec!["local/p: refused".into()]), StatusCode::BAD_GATEWAY),
            (internal_error("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
