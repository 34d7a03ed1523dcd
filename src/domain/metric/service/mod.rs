pub mod metric_fetch_service;
pub mod metric_query_service;
