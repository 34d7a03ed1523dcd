pub mod metrics_dto;

use serde::Serialize;

/// Envelope every successful API response is wrapped in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub is_successful: bool,
    pub data: Option<T>,
    pub error_msg: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            is_successful: true,
            data: Some(data),
            error_msg: None,
        }
    }
}
