use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::dto::ApiResponse;
use crate::errors::{internal_error, AppError};

/// Wraps a domain result in the response envelope, mapping its error onto an HTTP status.
pub fn to_json<T, E>(result: Result<T, E>) -> Result<Json<ApiResponse<Value>>, AppError>
where
    T: Serialize,
    E: Into<AppError>,
{
    let value = result.map_err(Into::into)?;
    let value = serde_json::to_value(value).map_err(internal_error)?;
    Ok(Json(ApiResponse::ok(value)))
}
